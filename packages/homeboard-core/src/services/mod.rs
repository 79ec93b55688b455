//! Application services layer.
//!
//! The services sit between the hub client and the panels: the router turns raw
//! hub notifications into store updates, the command registry dispatches
//! dashboard commands and the view manager owns the active view.

pub mod commands;
pub mod event_router;
pub mod view_manager;

pub use commands::{CommandHandler, CommandOutcome, CommandRegistry};
pub use event_router::EventRouter;
pub use view_manager::ViewManager;
