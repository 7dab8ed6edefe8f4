//! Registry lifecycle checks.
//!
//! These assertions read the global node counts, so everything lives in a
//! single test function (this binary runs it alone, no sibling tests
//! mutate the registry concurrently).

use gyeol_core::{graph, prelude::*};

#[test]
fn node_lifecycle_and_weak_output_references() {
    let values_before = graph::value_count();
    let ops_before = graph::op_count();

    // Dropping the user handle of a consumed intermediate keeps it alive
    // through the consumer's strong input edge; dropping the terminal
    // output tears the whole chain down.
    {
        let x = Value::scalar(2.0f32).unwrap();
        x.requires_grad().unwrap();
        let t = x.square().unwrap();
        let y = t.square().unwrap();

        drop(t);
        assert_eq!(graph::value_count(), values_before + 3);
        assert_eq!(graph::op_count(), ops_before + 2);

        drop(y);
        assert_eq!(graph::value_count(), values_before + 1);
        assert_eq!(graph::op_count(), ops_before);

        drop(x);
        assert_eq!(graph::value_count(), values_before);
    }

    // A terminal output with no user handle dies immediately, even though
    // its operation node existed moments before (weak back-reference).
    {
        let x = Value::scalar(1.5f32).unwrap();
        x.requires_grad().unwrap();
        let _ = x.exp().unwrap();
        assert_eq!(graph::value_count(), values_before + 1);
        assert_eq!(graph::op_count(), ops_before);
        drop(x);
        assert_eq!(graph::value_count(), values_before);
    }

    // Gradients are owned by their value node and die with it (or with an
    // explicit clear).
    {
        let x = Value::scalar(2.0f32).unwrap();
        x.requires_grad().unwrap();
        let y = x.square().unwrap();
        y.backward().unwrap();

        drop(y);
        // x plus its gradient remain.
        assert_eq!(graph::value_count(), values_before + 2);

        x.clear_grad();
        assert_eq!(graph::value_count(), values_before + 1);

        drop(x);
        assert_eq!(graph::value_count(), values_before);
    }

    // Unchaining releases the upstream subgraph once nothing else holds
    // it.
    {
        let x = Value::scalar(2.0f32).unwrap();
        x.requires_grad().unwrap();
        let y = x.square().unwrap().exp().unwrap();
        drop(x);
        assert_eq!(graph::op_count(), ops_before + 2);

        y.unchain_backward();
        assert_eq!(graph::op_count(), ops_before);
        assert_eq!(graph::value_count(), values_before + 1);

        drop(y);
        assert_eq!(graph::value_count(), values_before);
    }
}
