// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod column;
pub mod forms;
pub mod model;
pub mod schema;
pub mod state;
pub mod validation;

pub use column::*;
pub use forms::*;
pub use model::*;
pub use schema::*;
pub use state::*;
