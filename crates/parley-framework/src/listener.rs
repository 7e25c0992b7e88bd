//! Listener declarations.
//!
//! A listener ties a regular expression to a handler. Plugins declare them
//! with a small builder:
//!
//! ```rust,ignore
//! use parley_framework::{listen_to, listen_webhook, PatternFlags};
//!
//! // Inline handler, runs on the dispatcher's async runtime.
//! listen_to("^ping$")
//!     .needs_mention()
//!     .description("Replies with pong.")
//!     .inline(|ctx, msg, _groups| async move {
//!         ctx.reply(&msg, "pong").await?;
//!         Ok(())
//!     });
//!
//! // One handler under two patterns.
//! listen_to("^help$")
//!     .needs_mention()
//!     .or(listen_to("^!help$"))
//!     .threaded(|ctx, msg, _groups| {
//!         ctx.reply_blocking(&msg, "...")?;
//!         Ok(())
//!     });
//!
//! // Webhook listener, matched against the webhook id.
//! listen_webhook("ping").inline(|ctx, event, _| async move { Ok(()) });
//! ```
//!
//! # Matching
//!
//! Patterns are anchored at the start of the subject (message text or
//! webhook id) but not at the end, unless the pattern itself ends with `$`.
//! Capture groups that matched are handed to the handler in order; groups
//! that did not participate or matched the empty string are dropped.
//!
//! # Siblings
//!
//! `a.or(b)` declares one handler under several patterns. Each pattern
//! becomes its own [`ListenerEntry`] with its own flags and gates, and all of
//! them share the same handler allocation.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::BoxFuture;
use regex::{Regex, RegexBuilder};

use crate::context::BotContext;
use crate::error::{HandlerResult, ListenerError, ListenerResult};
use parley_core::{ChatMessage, WebhookEvent};

// ============================================================================
// Flags and gates
// ============================================================================

/// Regular expression flags for a listener pattern.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PatternFlags {
    /// Match letters case-insensitively.
    pub case_insensitive: bool,
    /// `^` and `$` match at line boundaries.
    pub multi_line: bool,
    /// `.` also matches `\n`.
    pub dot_all: bool,
}

impl PatternFlags {
    /// Case-insensitive matching only.
    pub const IGNORE_CASE: Self = Self {
        case_insensitive: true,
        multi_line: false,
        dot_all: false,
    };
}

/// Per-listener conditions checked before a message handler runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Gates {
    /// Only direct messages pass.
    pub direct_only: bool,
    /// The bot must be mentioned, or the message must be direct.
    pub needs_mention: bool,
    /// Lowercased usernames allowed to trigger the handler. Empty means all.
    pub allowed_users: HashSet<String>,
}

/// Result of checking a message against a listener's [`Gates`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// All gates passed.
    Run,
    /// A gate failed; the handler is skipped silently.
    Skip,
    /// The sender is not allowed; the bot replies with a denial.
    Deny,
}

impl Gates {
    /// Whether any gate is set.
    pub fn is_restricted(&self) -> bool {
        self.direct_only || self.needs_mention || !self.allowed_users.is_empty()
    }

    /// Checks the gates in order: direct-only, needs-mention, allowed users.
    pub fn evaluate(&self, message: &ChatMessage, bot_user_id: &str) -> GateDecision {
        if self.direct_only && !message.is_direct {
            return GateDecision::Skip;
        }

        if self.needs_mention && !(message.is_direct || message.mentions_user(bot_user_id)) {
            return GateDecision::Skip;
        }

        if !self.allowed_users.is_empty()
            && !self
                .allowed_users
                .contains(&message.sender_name.to_lowercase())
        {
            return GateDecision::Deny;
        }

        GateDecision::Run
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// How a listener's handler is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Spawned as a task on the dispatcher's async runtime.
    Inline,
    /// Submitted to the worker pool.
    Threaded,
}

/// An async handler run on the dispatcher's runtime.
pub type InlineFn<E> =
    dyn Fn(Arc<BotContext>, Arc<E>, Vec<String>) -> BoxFuture<'static, HandlerResult> + Send + Sync;

/// A blocking handler run on a worker thread.
pub type ThreadedFn<E> = dyn Fn(Arc<BotContext>, Arc<E>, Vec<String>) -> HandlerResult + Send + Sync;

/// A type-erased listener handler for events of type `E`.
pub enum Handler<E> {
    /// See [`ExecutionMode::Inline`].
    Inline(Arc<InlineFn<E>>),
    /// See [`ExecutionMode::Threaded`].
    Threaded(Arc<ThreadedFn<E>>),
}

impl<E: Send + Sync + 'static> Handler<E> {
    /// Wraps an async closure.
    pub fn inline<H, Fut>(handler: H) -> Self
    where
        H: Fn(Arc<BotContext>, Arc<E>, Vec<String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self::Inline(Arc::new(
            move |ctx: Arc<BotContext>,
                  event: Arc<E>,
                  groups: Vec<String>|
                  -> BoxFuture<'static, HandlerResult> {
                Box::pin(handler(ctx, event, groups))
            },
        ))
    }

    /// Wraps a blocking closure.
    pub fn threaded<H>(handler: H) -> Self
    where
        H: Fn(Arc<BotContext>, Arc<E>, Vec<String>) -> HandlerResult + Send + Sync + 'static,
    {
        Self::Threaded(Arc::new(handler))
    }
}

impl<E> Handler<E> {
    /// The execution mode tag.
    pub fn mode(&self) -> ExecutionMode {
        match self {
            Self::Inline(_) => ExecutionMode::Inline,
            Self::Threaded(_) => ExecutionMode::Threaded,
        }
    }

    /// Whether both handlers are the same allocation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Inline(a), Self::Inline(b)) => Arc::ptr_eq(a, b),
            (Self::Threaded(a), Self::Threaded(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl<E> Clone for Handler<E> {
    fn clone(&self) -> Self {
        match self {
            Self::Inline(h) => Self::Inline(Arc::clone(h)),
            Self::Threaded(h) => Self::Threaded(Arc::clone(h)),
        }
    }
}

impl<E> fmt::Debug for Handler<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler::{:?}", self.mode())
    }
}

// ============================================================================
// ListenSpec
// ============================================================================

/// An event type listeners can be declared for.
pub trait ListenerEvent: Send + Sync + Sized + 'static {
    /// The string patterns are matched against.
    fn match_subject(&self) -> &str;
}

impl ListenerEvent for ChatMessage {
    fn match_subject(&self) -> &str {
        &self.text
    }
}

impl ListenerEvent for WebhookEvent {
    fn match_subject(&self) -> &str {
        &self.webhook_id
    }
}

/// A listener declaration waiting for its handler.
///
/// Created by [`listen_to`] or [`listen_webhook`].
pub struct ListenSpec<E> {
    pub(crate) pattern: String,
    pub(crate) flags: PatternFlags,
    pub(crate) gates: Gates,
    pub(crate) description: Option<String>,
    pub(crate) usage: Option<String>,
    siblings: Vec<ListenSpec<E>>,
    _event: PhantomData<fn() -> E>,
}

/// Declares a message listener for `pattern`.
pub fn listen_to(pattern: impl Into<String>) -> ListenSpec<ChatMessage> {
    ListenSpec::new(pattern)
}

/// Declares a webhook listener for webhook ids matching `pattern`.
pub fn listen_webhook(pattern: impl Into<String>) -> ListenSpec<WebhookEvent> {
    ListenSpec::new(pattern)
}

impl<E: ListenerEvent> ListenSpec<E> {
    fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            flags: PatternFlags::default(),
            gates: Gates::default(),
            description: None,
            usage: None,
            siblings: Vec::new(),
            _event: PhantomData,
        }
    }

    /// Sets the regular expression flags.
    pub fn flags(mut self, flags: PatternFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Shorthand for case-insensitive matching.
    pub fn ignore_case(mut self) -> Self {
        self.flags.case_insensitive = true;
        self
    }

    /// Sets the text shown by the help listener.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Registers the same handler under another pattern.
    pub fn or(mut self, mut other: ListenSpec<E>) -> Self {
        let nested = std::mem::take(&mut other.siblings);
        self.siblings.push(other);
        self.siblings.extend(nested);
        self
    }

    /// Finishes the declaration with an async handler.
    pub fn inline<H, Fut>(self, handler: H) -> ListenerGroup<E>
    where
        H: Fn(Arc<BotContext>, Arc<E>, Vec<String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.with_handler(Handler::inline(handler))
    }

    /// Finishes the declaration with a blocking handler.
    pub fn threaded<H>(self, handler: H) -> ListenerGroup<E>
    where
        H: Fn(Arc<BotContext>, Arc<E>, Vec<String>) -> HandlerResult + Send + Sync + 'static,
    {
        self.with_handler(Handler::threaded(handler))
    }

    /// Finishes the declaration with a prebuilt handler.
    pub fn with_handler(mut self, handler: Handler<E>) -> ListenerGroup<E> {
        let siblings = std::mem::take(&mut self.siblings);
        let mut specs = Vec::with_capacity(1 + siblings.len());
        specs.push(self);
        specs.extend(siblings);

        // Siblings share a handler, so they share its description too.
        let shared = specs.iter().find_map(|s| s.description.clone());
        for spec in &mut specs {
            if spec.description.is_none() {
                spec.description.clone_from(&shared);
            }
        }

        ListenerGroup {
            specs,
            handler,
            error: None,
        }
    }
}

impl ListenSpec<ChatMessage> {
    /// Only direct messages trigger this listener.
    pub fn direct_only(mut self) -> Self {
        self.gates.direct_only = true;
        self
    }

    /// The bot must be mentioned, unless the message is direct.
    pub fn needs_mention(mut self) -> Self {
        self.gates.needs_mention = true;
        self
    }

    /// Restricts the listener to these usernames (case-insensitive).
    ///
    /// Other senders get a permission-denied reply.
    pub fn allowed_users<I, S>(mut self, users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.gates
            .allowed_users
            .extend(users.into_iter().map(|u| u.as_ref().to_lowercase()));
        self
    }
}

impl<E> fmt::Debug for ListenSpec<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenSpec")
            .field("pattern", &self.pattern)
            .field("flags", &self.flags)
            .field("gates", &self.gates)
            .field("siblings", &self.siblings.len())
            .finish()
    }
}

// ============================================================================
// ListenerGroup / ListenerEntry
// ============================================================================

/// One handler with all the patterns it was declared under.
///
/// Patterns are compiled when the group is registered.
pub struct ListenerGroup<E> {
    pub(crate) specs: Vec<ListenSpec<E>>,
    pub(crate) handler: Handler<E>,
    /// A declaration error, reported at registration.
    pub(crate) error: Option<ListenerError>,
}

impl<E: ListenerEvent> ListenerGroup<E> {
    /// Compiles every pattern into an entry.
    ///
    /// Fails without producing any entry if one pattern is invalid.
    pub fn compile(self) -> ListenerResult<Vec<ListenerEntry<E>>> {
        if let Some(error) = self.error {
            return Err(error);
        }

        let handler = self.handler;
        self.specs
            .into_iter()
            .map(|spec| {
                let pattern = compile_pattern(&spec.pattern, spec.flags)?;
                Ok(ListenerEntry {
                    source: spec.pattern,
                    flags: spec.flags,
                    pattern,
                    gates: spec.gates,
                    description: spec.description,
                    usage: spec.usage,
                    handler: handler.clone(),
                })
            })
            .collect()
    }
}

impl<E> fmt::Debug for ListenerGroup<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerGroup")
            .field("specs", &self.specs)
            .field("handler", &self.handler)
            .finish()
    }
}

/// Compiles a listener pattern, anchored at the start of the subject.
pub(crate) fn compile_pattern(pattern: &str, flags: PatternFlags) -> ListenerResult<Regex> {
    RegexBuilder::new(&format!(r"\A(?:{pattern})"))
        .case_insensitive(flags.case_insensitive)
        .multi_line(flags.multi_line)
        .dot_matches_new_line(flags.dot_all)
        .build()
        .map_err(|source| ListenerError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })
}

/// Extracts the handler arguments from a match of `pattern` on `subject`.
///
/// Returns `None` if the pattern does not match.
pub(crate) fn match_groups(pattern: &Regex, subject: &str) -> Option<Vec<String>> {
    let captures = pattern.captures(subject)?;
    Some(
        captures
            .iter()
            .skip(1)
            .flatten()
            .map(|m| m.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

/// A compiled listener: one pattern, its gates, and a handler.
///
/// Immutable once registered.
pub struct ListenerEntry<E> {
    source: String,
    flags: PatternFlags,
    pattern: Regex,
    gates: Gates,
    description: Option<String>,
    usage: Option<String>,
    handler: Handler<E>,
}

impl<E> ListenerEntry<E> {
    /// The pattern as declared.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The pattern flags.
    pub fn flags(&self) -> PatternFlags {
        self.flags
    }

    /// The compiled, start-anchored pattern.
    pub fn pattern(&self) -> &Regex {
        &self.pattern
    }

    /// The gates checked before a message handler runs.
    pub fn gates(&self) -> &Gates {
        &self.gates
    }

    /// Help text, if any.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Usage text for command listeners.
    pub fn usage(&self) -> Option<&str> {
        self.usage.as_deref()
    }

    /// The handler.
    pub fn handler(&self) -> &Handler<E> {
        &self.handler
    }

    /// The execution mode of the handler.
    pub fn mode(&self) -> ExecutionMode {
        self.handler.mode()
    }

    /// Whether this entry and `other` were declared as siblings.
    pub fn shares_handler_with(&self, other: &Self) -> bool {
        self.handler.ptr_eq(&other.handler)
    }
}

impl<E> Clone for ListenerEntry<E> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            flags: self.flags,
            pattern: self.pattern.clone(),
            gates: self.gates.clone(),
            description: self.description.clone(),
            usage: self.usage.clone(),
            handler: self.handler.clone(),
        }
    }
}

impl<E> fmt::Debug for ListenerEntry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerEntry")
            .field("source", &self.source)
            .field("flags", &self.flags)
            .field("gates", &self.gates)
            .field("mode", &self.mode())
            .finish()
    }
}
