//! The uniform calling interface shared by everything a form head can name.

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::error::BadValue;
use crate::exception::Exception;
use crate::external_cmd::ExternalCmd;
use crate::frame::Frame;
use crate::value::Value;

/// Evaluated options of a call, in source order.
pub type OptMap = IndexMap<String, Value>;

/// Anything callable as a command: closures, native functions, external
/// commands.
///
/// A call runs against the caller's frame; implementations fork it as needed
/// to run bodies or spawn processes with their own ports. A call produces no
/// return value; results flow through the frame's output port.
#[async_trait]
pub trait Callable: Send + Sync {
    /// A short name for messages and reprs.
    fn name(&self) -> &str;

    async fn call(
        &self,
        fm: &mut Frame,
        args: Vec<Value>,
        opts: OptMap,
    ) -> Result<(), Exception>;
}

/// Resolves a head value to a callable: fn values call directly, strings
/// name external commands.
pub(crate) fn to_callable(head: &Value) -> Result<Arc<dyn Callable>, BadValue> {
    match head {
        Value::Fn(f) => Ok(f.clone()),
        Value::Str(name) => Ok(Arc::new(ExternalCmd::new(name.clone()))),
        other => Err(BadValue::new(
            "command head",
            "fn or string",
            other.kind(),
        )),
    }
}
