pub mod controller;
pub mod driver;
pub mod element;
pub mod errors;
pub mod group;
pub mod resource;
pub mod template;
pub mod testing;
pub mod types;
pub mod wait;

pub use controller::{Component, Controller, Session};
pub use driver::Driver;
#[cfg(feature = "chrome")]
pub use driver::chrome::{ChromeDriver, ChromeNode};
pub use element::{Check, Checks, Element, Elements};
pub use errors::{PageError, Result};
pub use group::{CheckGroup, Group, GroupBuilder};
pub use resource::{FieldKind, Resource, Schema};
pub use template::{substitute, TemplateParams};
pub use types::*;
pub use wait::{OnError, SyncConfig, SyncEngine};
