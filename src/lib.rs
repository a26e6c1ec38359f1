//! Machina - Hierarchical State-Machine Diagram Editor
//! Document model with undoable edits, geometry resolution for nested
//! diagrams, and a pointer-gesture interaction controller

pub mod document;
pub mod geometry;
pub mod interaction;
pub mod io;
pub mod model;

pub use document::{CommandLog, DocumentStore, EditAction};
pub use geometry::{resolve, Scene};
pub use interaction::{Controller, Intent, ViewTransform};
pub use model::{Machine, Machines, StateNode, Transition};
