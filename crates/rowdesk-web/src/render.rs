// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;

use crate::tab::TabLayout;

const PAGE_TEMPLATE: &str = "page.html";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TabLink {
    pub table: String,
    pub href: String,
    pub active: bool,
}

/// HTML renderer over a MiniJinja environment. Templates ending in `.html`
/// are auto-escaped.
pub struct Renderer {
    env: Environment<'static>,
}

impl Renderer {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template(PAGE_TEMPLATE, include_str!("templates/page.html"))
            .context("load page template")?;
        Ok(Self { env })
    }

    pub fn render_page(&self, title: &str, tabs: &[TabLink], active: &TabLayout) -> Result<String> {
        let template = self
            .env
            .get_template(PAGE_TEMPLATE)
            .context("look up page template")?;
        template
            .render(context! {
                title => title,
                tabs => tabs,
                tab => active,
            })
            .with_context(|| format!("render tab {}", active.table))
    }
}
