//! Subscriber notification for monitoring reports.
//!
//! This crate provides:
//! - `Notifier` trait for pluggable delivery channels
//! - SMTP email notifier
//! - Minijinja rendering of the report email
//! - The stage handler for the `notification` channel

pub mod email;
pub mod stage;
pub mod templating;
pub mod traits;

pub use email::EmailNotifier;
pub use stage::NotificationStage;
pub use templating::{ReportContext, TemplateRenderer};
pub use traits::{Notification, Notifier, NotifyError, Recipient};
