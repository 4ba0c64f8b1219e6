// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod actions;
pub mod export;
pub mod grid;
pub mod ids;
pub mod model;
pub mod options;
pub mod query;
pub mod scheduler;
pub mod selection;
pub mod state;
pub mod sticky;
pub mod validation;

pub use actions::*;
pub use export::*;
pub use grid::*;
pub use ids::*;
pub use model::*;
pub use options::*;
pub use query::{QueryFragment, decode, encode, merge_into_url};
pub use scheduler::*;
pub use selection::*;
pub use state::*;
pub use sticky::*;
pub use validation::{Coercion, ValidationError};
