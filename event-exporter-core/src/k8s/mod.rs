mod identity;
mod util;

pub use identity::*;
pub use util::*;

use crate::errors::*;

err_impl! {KubernetesError,
    #[error("field not found in struct: {0}")]
    FieldNotFound(String),
}

pub trait KubeResourceExt {
    fn namespaced_name(&self) -> String;
}
