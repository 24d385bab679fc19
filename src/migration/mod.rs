//! Process instance migration: moves a running process instance to another process definition.
//!
//! The [`validator`] turns a [`MigrationCommand`] into a [`MigrationPlan`] or a [`Rejection`];
//! the [`executor`] and [`reconciler`] apply the plan inside one unit of work run by the
//! [`processor`].

pub mod instructions;
pub mod preconditions;
pub mod reconciler;
pub mod validator;
pub mod executor;
pub mod processor;

pub use self::instructions::{MappingInstruction, MigrationCommand};
pub use self::preconditions::{AllowAll, Authorization, AuthorizationRequest, Authorizer, MigrationError, Rejection};
pub use self::processor::MigrateProcessor;
pub use self::validator::{MigrationPlan, MigrationValidator};
