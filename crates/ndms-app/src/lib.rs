// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod edit;
pub mod error;
pub mod fetch;
pub mod filters;
pub mod model;
pub mod projection;
pub mod record;
pub mod schema;
pub mod state;

pub use edit::*;
pub use error::*;
pub use fetch::*;
pub use filters::*;
pub use model::*;
pub use projection::*;
pub use record::*;
pub use schema::*;
pub use state::*;
