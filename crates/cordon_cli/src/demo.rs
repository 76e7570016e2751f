//! The greeting scenario.
//!
//! A `hello` shape contributes a `format` feature and the `Itch` error; a
//! `main` shape contributes the `Damn` error and a greeter service that can
//! raise `Mute`. The two are merged into one `greeting` context.

use async_trait::async_trait;
use cordon_core::{ContextResult, ErrorVariant, Fault};
use cordon_runtime::{
    BoundService, Context, ContextShape, Disposable, DisposeError, Handlers, RuntimeConfig,
    Service,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Longest name the greeter will pronounce
const MAX_NAME: usize = 32;

fn shout(text: &str) -> String {
    format!("{}!", text.to_uppercase())
}

/// Service that builds salutations
pub struct Greeter {
    service: Service,
}

impl Greeter {
    /// Build the greeter with its own context
    pub fn new(salutation: &str) -> ContextResult<Self> {
        let context = ContextShape::builder("greeter")
            .feature("salutation")
            .error(ErrorVariant::new("Mute"))
            .build()?
            .instantiate()
            .feature("salutation", salutation.to_string())
            .build()?;
        Ok(Self {
            service: Service::new(context),
        })
    }

    /// Salute someone, or fail with `Mute` when the name is too long
    pub fn salute(&self, name: &str) -> Result<String, Fault> {
        if name.chars().count() > MAX_NAME {
            let error = self
                .service
                .error("Mute")?
                .with_message("name too long to pronounce")
                .with_detail("length", name.chars().count());
            return Err(error.into());
        }
        let salutation = self.service.feature::<String>("salutation")?;
        Ok(format!("{salutation}, {name}"))
    }
}

impl BoundService for Greeter {
    fn service(&self) -> &Service {
        &self.service
    }
}

#[async_trait]
impl Disposable for Greeter {
    fn name(&self) -> &str {
        "greeter"
    }

    async fn dispose_async(&self) -> Result<(), DisposeError> {
        info!("greeter closed");
        Ok(())
    }
}

/// Merged demo declaration
pub fn shape(config: &RuntimeConfig) -> ContextResult<ContextShape> {
    let hello = ContextShape::builder("hello")
        .feature("format")
        .error(ErrorVariant::new("Itch"))
        .build()?;
    let main = ContextShape::builder("main")
        .error(ErrorVariant::new("Damn"))
        .service("greeter")
        .build()?;
    ContextShape::merge_with("greeting", &[&hello, &main], config)
}

/// Demo context with every value supplied
pub fn context(config: RuntimeConfig) -> ContextResult<Context> {
    shape(&config)?
        .instantiate()
        .feature("format", shout as fn(&str) -> String)
        .service("greeter", Arc::new(Greeter::new("hello")?))
        .config(config)
        .build()
}

/// What a greeting run produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    /// Greeting or handler message
    pub message: String,
    /// Whether the session scope ended cancelled
    pub cancelled: bool,
}

/// Greet someone under a fresh session
///
/// An empty name raises `Itch`; an overlong one makes the greeter raise
/// `Mute`. Both are handled and cancel the session.
pub fn greet(context: &Context, name: &str) -> Result<Outcome, Fault> {
    let session = context.init();

    let message = session.catch(
        || {
            if name.trim().is_empty() {
                return Err(session
                    .error("Itch")?
                    .with_message("nobody to greet")
                    .into());
            }
            let greeter = session.service::<Greeter>("greeter")?;
            let format = session.feature::<fn(&str) -> String>("format")?;
            Ok(format(&greeter.salute(name)?))
        },
        Handlers::new()
            .on("Itch", |fault| Ok(format!("handled {fault}")))
            .on("Mute", |fault| Ok(format!("greeter muted: {fault}"))),
    )?;

    Ok(Outcome {
        message,
        cancelled: session.is_cancelled(),
    })
}
