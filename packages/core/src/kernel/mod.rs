// Kernel - core infrastructure with dependency injection
//
// The ServerKernel holds all server dependencies (database, injected
// collaborators) and provides dependency injection through traits for
// testability.
//
// IMPORTANT: Kernel is for INFRASTRUCTURE only, not business logic.
// Business logic belongs in domain layers.

pub mod operator_directory;
pub mod server_kernel;
pub mod traits;

pub use operator_directory::PostgresOperatorDirectory;
pub use server_kernel::ServerKernel;
pub use traits::{
    BaseNotificationSink, BaseOperatorDirectory, ChannelNotificationSink, LoggingNotificationSink,
    StaticOperatorDirectory,
};
