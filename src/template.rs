use crate::error::{Error, Result};
use serde::Serialize;
use tera::{Context, Tera};

/// Built-in templates, registered under their name.
const BUILTIN_TEMPLATES: &[(&str, &str)] =
    &[("markdown", include_str!("../templates/markdown.tera"))];

/// Template engine behind the markdown assembler.
pub(crate) struct TemplateEngine {
    tera: Tera,
}

impl TemplateEngine {
    /// Creates an engine with every built-in template registered.
    ///
    /// # Errors
    ///
    /// Returns an error if a template fails to parse.
    pub(crate) fn new() -> Result<Self> {
        let mut tera = Tera::default();

        Self::register_builtin_templates(&mut tera)?;

        Ok(Self { tera })
    }

    fn register_builtin_templates(tera: &mut Tera) -> Result<()> {
        for (name, source) in BUILTIN_TEMPLATES {
            tera.add_raw_template(name, source)
                .map_err(|e| Error::template(*name, &e))?;
        }
        Ok(())
    }

    /// Renders `name` with `context` available as `ctx`.
    ///
    /// # Errors
    ///
    /// Returns an error if the template is unknown or rendering fails.
    pub(crate) fn render<T: Serialize>(&self, name: &str, context: &T) -> Result<String> {
        let mut tera_context = Context::new();
        tera_context.insert("ctx", context);

        self.tera
            .render(name, &tera_context)
            .map_err(|e| Error::template(name, &e))
    }
}
