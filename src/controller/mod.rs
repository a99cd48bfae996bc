//! Controller implementations for the aws-auth CRDs
//!
//! MapRole and MapUser share one generic reconciler that follows the
//! observe-diff-act loop against the aws-auth ConfigMap.

mod mapping;

pub use mapping::{
    error_policy, reconcile, Context, FinalizerClient, KubeFinalizerClient, MAPPING_FINALIZER,
};
