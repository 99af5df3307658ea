//! Data models for LabWatch

mod alert;
mod decision;
mod reading;

pub use alert::*;
pub use decision::*;
pub use reading::*;
