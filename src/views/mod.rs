//! Presentation layer. Handlers assemble plain view-models; this module turns
//! them into HTML through handlebars templates, which HTML-escape every
//! `{{value}}` they interpolate.

pub mod index;

use handlebars::{Handlebars, RenderError, TemplateError};
use index::IndexView;

const INDEX_TEMPLATE: &str = "index";

/// Compiled page templates, registered once at startup.
pub struct Templates {
    engine: Handlebars<'static>,
}

impl Templates {
    pub fn new() -> Result<Self, TemplateError> {
        let mut engine = Handlebars::new();
        // a typo in a template should fail the render, not print nothing
        engine.set_strict_mode(true);
        engine.register_template_string(
            INDEX_TEMPLATE,
            include_str!("../../templates/index.hbs"),
        )?;
        Ok(Self { engine })
    }

    pub fn render_index(&self, view: &IndexView) -> Result<String, RenderError> {
        self.engine.render(INDEX_TEMPLATE, view)
    }
}
