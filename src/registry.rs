//! Command registry.
//!
//! Remote commands are declared once, in a static table written with
//! [`remote_commands!`](crate::remote_commands). Each entry records the
//! command name, its parameter names in declaration order, and a
//! type-erased handler that pulls positional arguments out of a request and
//! calls the target's method.
//!
//! The registry is built at startup and only read afterwards.

use crate::{log_warn, PendingResult};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future returned by type-erased command handlers.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Type-erased command handler.
///
/// Receives the target and the positional arguments (one per declared
/// parameter, `Value::Null` when absent) and yields the command's pending
/// result, or `None` if the command produced nothing to wait for.
pub type CommandFn<T> = fn(Arc<T>, Vec<Value>) -> BoxFuture<'static, Option<PendingResult>>;

/// Conversion from a request field into a handler argument.
pub trait FromArg: Sized {
    fn from_arg(value: Value) -> Self;
}

impl FromArg for Value {
    fn from_arg(value: Value) -> Self {
        value
    }
}

impl FromArg for Option<Value> {
    fn from_arg(value: Value) -> Self {
        match value {
            Value::Null => None,
            other => Some(other),
        }
    }
}

/// Strings pass through and numbers are rendered, so a phone number sent as
/// a JSON number still works. Anything else counts as absent.
impl FromArg for Option<String> {
    fn from_arg(value: Value) -> Self {
        match value {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// One remotely callable operation.
pub struct CommandDescriptor<T> {
    name: &'static str,
    params: &'static [&'static str],
    handler: CommandFn<T>,
}

impl<T> Clone for CommandDescriptor<T> {
    fn clone(&self) -> Self {
        // ---
        Self {
            name: self.name,
            params: self.params,
            handler: self.handler,
        }
    }
}

impl<T> std::fmt::Debug for CommandDescriptor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}

impl<T> CommandDescriptor<T> {
    // ---

    pub const fn new(
        name: &'static str,
        params: &'static [&'static str],
        handler: CommandFn<T>,
    ) -> Self {
        // ---
        Self {
            name,
            params,
            handler,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Parameter names in declaration order.
    pub fn params(&self) -> &'static [&'static str] {
        self.params
    }

    /// Pick this command's arguments out of a request, in declared order.
    pub fn bind_args(&self, fields: &Map<String, Value>) -> Vec<Value> {
        // ---
        self.params
            .iter()
            .map(|param| fields.get(*param).cloned().unwrap_or(Value::Null))
            .collect()
    }

    /// Call the handler with positional arguments.
    pub fn invoke(&self, target: Arc<T>, args: Vec<Value>) -> BoxFuture<'static, Option<PendingResult>> {
        (self.handler)(target, args)
    }
}

/// Implemented (via [`remote_commands!`](crate::remote_commands)) by types
/// that expose remote commands.
pub trait RemoteCommands: Send + Sync + Sized + 'static {
    fn remote_commands() -> Vec<CommandDescriptor<Self>>;
}

/// Name → descriptor lookup table.
pub struct CommandRegistry<T> {
    commands: HashMap<&'static str, CommandDescriptor<T>>,
}

impl<T: RemoteCommands> CommandRegistry<T> {
    /// Build the registry from the target's declaration table.
    pub fn build() -> Self {
        Self::from_descriptors(T::remote_commands())
    }
}

impl<T> CommandRegistry<T> {
    // ---

    /// Build from an explicit list. The first declaration of a name wins.
    pub fn from_descriptors<I>(descriptors: I) -> Self
    where
        I: IntoIterator<Item = CommandDescriptor<T>>,
    {
        // ---
        let mut commands = HashMap::new();
        for descriptor in descriptors {
            if commands.contains_key(descriptor.name) {
                log_warn!("duplicate remote command {} ignored", descriptor.name);
                continue;
            }
            commands.insert(descriptor.name, descriptor);
        }
        Self { commands }
    }

    pub fn lookup(&self, name: &str) -> Option<&CommandDescriptor<T>> {
        self.commands.get(name)
    }

    /// Registered command names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        // ---
        let mut names: Vec<&'static str> = self.commands.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Declare the remote commands of a type.
///
/// Every listed method must be an `async fn(&self, ...) -> Option<PendingResult>`
/// whose parameters implement [`FromArg`]. Parameter names become the request
/// field names.
///
/// ```ignore
/// remote_commands! {
///     Bridge {
///         message_send(number, msg);
///         group_create(subject, numbers);
///     }
/// }
/// ```
#[macro_export]
macro_rules! remote_commands {
    ($target:ty { $( $name:ident ( $( $param:ident ),* $(,)? ) ; )* }) => {
        impl $crate::RemoteCommands for $target {
            fn remote_commands() -> ::std::vec::Vec<$crate::CommandDescriptor<Self>> {
                ::std::vec![
                    $(
                        $crate::CommandDescriptor::<Self>::new(
                            ::std::stringify!($name),
                            &[ $( ::std::stringify!($param) ),* ],
                            |target, args| {
                                #[allow(unused_mut, unused_variables)]
                                let mut args = args.into_iter();
                                $(
                                    let $param = $crate::FromArg::from_arg(
                                        args.next().unwrap_or_default(),
                                    );
                                )*
                                let fut: $crate::BoxFuture<
                                    'static,
                                    ::std::option::Option<$crate::PendingResult>,
                                > =
                                    ::std::boxed::Box::pin(async move {
                                        target.$name( $( $param ),* ).await
                                    });
                                fut
                            },
                        ),
                    )*
                ]
            }
        }
    };
}
