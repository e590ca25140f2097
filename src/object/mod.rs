//! Object model: opaque handles, typed parameters, reference-counted entities
//! and the type-name registry.

pub mod handle;
pub mod param;
pub mod entity;
pub mod commit;
pub mod table;
pub mod registry;

pub use handle::*;
pub use param::{ParamSet, ParamValue};
pub use entity::{Entity, ManagedObject, ObjectBody, Snapshot};
pub use commit::CommitContext;
pub use table::HandleTable;
pub use registry::{Factory, ObjectRegistry};
