use std::collections::HashMap;
use std::future::Future;
use std::io::Write;
use std::pin::Pin;

use tracing::{debug, info, warn};
use url::Url;

use crate::config::Session;
use crate::error::{GatorError, Result, StoreError};
use crate::feed::{FeedFetcher, FetchContext};
use crate::follow;
use crate::identity;
use crate::models::{Feed, User};
use crate::storage::SharedStore;

pub const DEFAULT_FEED_URL: &str = "https://www.wagslane.dev/index.xml";

/// Everything a handler may touch during one invocation.
pub struct State {
    pub session: Session,
    pub store: SharedStore,
    pub fetcher: FeedFetcher,
    pub fetch_ctx: FetchContext,
    pub out: Box<dyn Write + Send>,
}

impl State {
    pub fn new(session: Session, store: SharedStore, fetcher: FeedFetcher) -> Self {
        let fetch_ctx = FetchContext::background().with_timeout(session.config().fetch_timeout());
        Self {
            session,
            store,
            fetcher,
            fetch_ctx,
            out: Box::new(std::io::stdout()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub args: Vec<String>,
}

impl Command {
    pub fn new(name: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Splits process arguments (program name already removed) into the
    /// command name and its positional arguments.
    pub fn from_args(args: impl IntoIterator<Item = String>) -> Option<Self> {
        let mut args = args.into_iter();
        let name = args.next()?;
        Some(Self {
            name,
            args: args.collect(),
        })
    }

    fn require(&self, count: usize, command: &'static str, expected: &'static str) -> Result<()> {
        if self.args.len() < count {
            return Err(GatorError::Argument { command, expected });
        }
        Ok(())
    }
}

pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + 'a>>;
pub type OpenHandler = for<'a> fn(&'a mut State, &'a Command) -> HandlerFuture<'a>;
pub type GatedHandler = for<'a> fn(&'a mut State, &'a Command, User) -> HandlerFuture<'a>;

/// A registered handler. `Gated` handlers only run once the current user has
/// been resolved; if resolution fails they are never invoked.
#[derive(Clone, Copy)]
pub enum Handler {
    Open(OpenHandler),
    Gated(GatedHandler),
}

#[derive(Default)]
pub struct Registry {
    handlers: HashMap<String, Handler>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in command.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("login", Handler::Open(login));
        registry.register("register", Handler::Open(register));
        registry.register("reset", Handler::Open(reset));
        registry.register("users", Handler::Open(users));
        registry.register("agg", Handler::Open(agg));
        registry.register("addfeed", Handler::Gated(add_feed));
        registry.register("feeds", Handler::Open(feeds));
        registry.register("follow", Handler::Gated(follow_feed));
        registry.register("following", Handler::Gated(following));
        registry.register("unfollow", Handler::Gated(unfollow_feed));
        registry
    }

    /// Stores `handler` under `name`, replacing any earlier registration.
    pub fn register(&mut self, name: impl Into<String>, handler: Handler) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub async fn dispatch(&self, state: &mut State, command: &Command) -> Result<()> {
        let handler = *self
            .handlers
            .get(&command.name)
            .ok_or_else(|| GatorError::UnknownCommand(command.name.clone()))?;
        debug!(command = %command.name, args = command.args.len(), "dispatching");

        match handler {
            Handler::Open(run) => run(state, command).await,
            Handler::Gated(run) => {
                let user =
                    identity::current_user(state.store.as_ref(), state.session.config()).await?;
                run(state, command, user).await
            }
        }
    }

    /// Like `dispatch`, but abandons the command with `Interrupted` as soon
    /// as `interrupt` resolves. Dropping the handler drops any in-flight
    /// query or fetch with it.
    pub async fn dispatch_until<F>(
        &self,
        state: &mut State,
        command: &Command,
        interrupt: F,
    ) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            _ = interrupt => {
                warn!(command = %command.name, "command interrupted");
                Err(GatorError::Interrupted)
            }
            result = self.dispatch(state, command) => result,
        }
    }
}

fn parse_url(command: &'static str, raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|source| GatorError::InvalidUrl {
        command,
        url: raw.to_owned(),
        source,
    })
}

fn login<'a>(state: &'a mut State, cmd: &'a Command) -> HandlerFuture<'a> {
    Box::pin(async move {
        cmd.require(1, "login", "one argument, the username")?;
        let user = identity::user_by_name(state.store.as_ref(), &cmd.args[0]).await?;
        state.session.set_current_user(&user.name)?;
        info!(user = %user.name, "logged in");
        writeln!(state.out, "'{}' now logged in", user.name)?;
        Ok(())
    })
}

fn register<'a>(state: &'a mut State, cmd: &'a Command) -> HandlerFuture<'a> {
    Box::pin(async move {
        cmd.require(1, "register", "one argument, the username")?;
        let name = &cmd.args[0];
        if name.is_empty() || name.trim() != name {
            return Err(GatorError::Argument {
                command: "register",
                expected: "a non-empty username without surrounding whitespace",
            });
        }
        let user = match state.store.create_user(User::new(name.as_str())).await {
            Ok(user) => user,
            Err(StoreError::Conflict(_)) => return Err(GatorError::UserExists(name.clone())),
            Err(e) => return Err(GatorError::persistence("create user")(e)),
        };
        state.session.set_current_user(&user.name)?;
        info!(user = %user.name, id = %user.id, "registered user");
        writeln!(
            state.out,
            "user successfully registered and logged in: {} ({})",
            user.name, user.id
        )?;
        Ok(())
    })
}

fn reset<'a>(state: &'a mut State, _cmd: &'a Command) -> HandlerFuture<'a> {
    Box::pin(async move {
        state
            .store
            .clear_users()
            .await
            .map_err(GatorError::persistence("reset users table"))?;
        info!("cleared users table");
        writeln!(state.out, "successfully cleared user table")?;
        Ok(())
    })
}

fn users<'a>(state: &'a mut State, _cmd: &'a Command) -> HandlerFuture<'a> {
    Box::pin(async move {
        let users = state
            .store
            .list_users()
            .await
            .map_err(GatorError::persistence("list users"))?;
        let current = state.session.config().current_user();
        for user in users {
            if Some(user.name.as_str()) == current {
                writeln!(state.out, "* {} (current)", user.name)?;
            } else {
                writeln!(state.out, "* {}", user.name)?;
            }
        }
        Ok(())
    })
}

fn agg<'a>(state: &'a mut State, cmd: &'a Command) -> HandlerFuture<'a> {
    Box::pin(async move {
        let raw = cmd.args.first().map(String::as_str).unwrap_or(DEFAULT_FEED_URL);
        let url = parse_url("agg", raw)?;
        let feed = state.fetcher.fetch(url.as_str(), &state.fetch_ctx).await?;
        writeln!(state.out, "{}", serde_json::to_string_pretty(&feed)?)?;
        Ok(())
    })
}

fn add_feed<'a>(state: &'a mut State, cmd: &'a Command, user: User) -> HandlerFuture<'a> {
    Box::pin(async move {
        cmd.require(2, "addfeed", "two arguments: the name of the feed and the url")?;
        let (name, url) = (&cmd.args[0], &cmd.args[1]);
        parse_url("addfeed", url)?;

        let store = state.store.as_ref();
        let feed = match store.create_feed(Feed::new(name.as_str(), url.as_str(), user.id)).await {
            Ok(feed) => feed,
            Err(StoreError::Conflict(_)) => return Err(GatorError::FeedExists(url.clone())),
            Err(e) => return Err(GatorError::persistence("create feed")(e)),
        };
        info!(feed = %feed.name, url = %feed.url, owner = %user.name, "added feed");
        if let Err(err) = follow::create_follow(store, &user, &feed).await {
            // roll the feed back so the command leaves nothing behind
            if let Err(cleanup) = store.delete_feed(feed.id).await {
                warn!(feed = %feed.id, error = %cleanup, "failed to remove feed after follow error");
            }
            return Err(err);
        }

        writeln!(state.out, "{}", serde_json::to_string_pretty(&feed)?)?;
        writeln!(state.out, "user {} is now following {}", user.name, feed.name)?;
        Ok(())
    })
}

fn feeds<'a>(state: &'a mut State, _cmd: &'a Command) -> HandlerFuture<'a> {
    Box::pin(async move {
        let feeds = state
            .store
            .list_feeds()
            .await
            .map_err(GatorError::persistence("list feeds"))?;
        writeln!(state.out, "{}", serde_json::to_string_pretty(&feeds)?)?;
        Ok(())
    })
}

fn follow_feed<'a>(state: &'a mut State, cmd: &'a Command, user: User) -> HandlerFuture<'a> {
    Box::pin(async move {
        cmd.require(1, "follow", "one argument: the url")?;
        parse_url("follow", &cmd.args[0])?;
        let store = state.store.as_ref();
        let feed = follow::feed_by_url(store, &cmd.args[0]).await?;
        follow::create_follow(store, &user, &feed).await?;
        writeln!(state.out, "user {} is now following {}", user.name, feed.name)?;
        Ok(())
    })
}

fn following<'a>(state: &'a mut State, _cmd: &'a Command, user: User) -> HandlerFuture<'a> {
    Box::pin(async move {
        let names = follow::list_follows_for_user(state.store.as_ref(), user.id).await?;
        for name in names {
            writeln!(state.out, "* {}", name)?;
        }
        Ok(())
    })
}

fn unfollow_feed<'a>(state: &'a mut State, cmd: &'a Command, user: User) -> HandlerFuture<'a> {
    Box::pin(async move {
        cmd.require(1, "unfollow", "one argument: the url")?;
        parse_url("unfollow", &cmd.args[0])?;
        let store = state.store.as_ref();
        let feed = follow::feed_by_url(store, &cmd.args[0]).await?;
        follow::delete_follow(store, user.id, feed.id).await?;
        writeln!(state.out, "user {} is no longer following {}", user.name, feed.name)?;
        Ok(())
    })
}
