// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod render;
pub mod runtime;
pub mod server;
pub mod tab;
pub mod widgets;
pub mod wiring;

pub use render::{Renderer, TabLink};
pub use runtime::TableRuntime;
pub use server::{
    AppState, MAX_SESSIONS, SESSION_COOKIE, SESSION_IDLE_TIMEOUT, SharedRuntime, WebError, router,
    serve,
};
pub use tab::{Control, DropdownOptions, EventRegistry, TabLayout, TableTab};
pub use widgets::GridStyle;
pub use wiring::{TabInput, handle_event};
