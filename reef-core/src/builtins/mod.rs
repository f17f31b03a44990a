//! The builtin namespace: the values and native functions every
//! interpreter starts with.

mod container;
mod flow;
mod io;
mod misc;
mod num;

use crate::ns::Ns;
use crate::value::Value;
use crate::vars::Variable;

pub(crate) fn builtin_ns() -> Ns {
    let ns = Ns::new();
    ns.assign("true", Variable::read_only(Value::Bool(true)));
    ns.assign("false", Variable::read_only(Value::Bool(false)));
    ns.assign("nil", Variable::read_only(Value::Nil));
    io::register(&ns);
    flow::register(&ns);
    container::register(&ns);
    num::register(&ns);
    misc::register(&ns);
    ns
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ns::FN_SUFFIX;

    #[test]
    fn the_usual_suspects_are_bound() {
        let ns = builtin_ns();
        for name in ["put", "each", "range", "echo", "fail", "+", "sleep"] {
            assert!(ns.has(&format!("{name}{FN_SUFFIX}")), "missing {name}");
        }
        assert_eq!(
            ns.get("true").unwrap().get().unwrap(),
            Value::Bool(true)
        );
    }
}
