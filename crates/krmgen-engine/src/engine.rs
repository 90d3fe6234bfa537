//! Template evaluator based on MiniJinja

use minijinja::{Environment, UndefinedBehavior};

use crate::error::{EngineError, Result, TemplateError};
use crate::filters;
use crate::providers::ProviderContext;
use crate::registry::FunctionRegistry;

/// Name used for templates evaluated without a file name
pub const DEFAULT_TEMPLATE_NAME: &str = "krmgen";

/// Expands template directives in configuration text
#[derive(Debug, Clone)]
pub struct Evaluator {
    registry: FunctionRegistry,
}

impl Evaluator {
    /// Evaluator calling the providers of `ctx`
    pub fn new(ctx: &ProviderContext) -> Self {
        Self {
            registry: FunctionRegistry::build(ctx),
        }
    }

    /// A fresh environment per evaluation, nothing leaks between templates
    fn create_environment(&self) -> Environment<'static> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);
        env.set_auto_escape_callback(|_| minijinja::AutoEscape::None);

        filters::register(&mut env);
        self.registry.install(&mut env);
        env
    }

    /// Evaluate `content` with an empty context
    pub fn evaluate(&self, content: &str) -> Result<String> {
        self.evaluate_named(DEFAULT_TEMPLATE_NAME, content)
    }

    /// Evaluate `content`, naming it `name` in error reports
    ///
    /// Blank input is returned unchanged without being parsed.
    pub fn evaluate_named(&self, name: &str, content: &str) -> Result<String> {
        if content.trim().is_empty() {
            return Ok(content.to_string());
        }

        let to_error = |e: minijinja::Error| {
            let known = self.registry.names();
            EngineError::Template(TemplateError::from_minijinja(e, name, content, &known))
        };

        let mut env = self.create_environment();
        env.add_template_owned(name.to_string(), content.to_string())
            .map_err(to_error)?;

        let template = env.get_template(name).map_err(to_error)?;
        template.render(()).map_err(to_error)
    }
}
