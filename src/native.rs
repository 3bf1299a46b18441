//! Host‑provided functions, registered into the global environment once when
//! the interpreter is built.

use std::fmt;

use chrono::Utc;
use log::debug;

use crate::value::Value;

/// Natives receive the evaluated arguments and report failures as a bare
/// message; the call site attaches the line.
pub type NativeFn = for<'a> fn(&[Value<'a>]) -> Result<Value<'a>, String>;

pub struct NativeFunction {
    pub name: &'static str,
    pub arity: usize,
    pub func: NativeFn,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

/// Every native, in registration order.
pub fn all() -> Vec<NativeFunction> {
    vec![NativeFunction {
        name: "clock",
        arity: 0,
        func: clock,
    }]
}

/// Seconds since the Unix epoch, with millisecond resolution.
fn clock<'a>(_args: &[Value<'a>]) -> Result<Value<'a>, String> {
    let millis = Utc::now().timestamp_millis();
    debug!("clock() -> {}ms", millis);

    Ok(Value::Number(millis as f64 / 1000.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_is_zero_arity_and_monotonic_enough() {
        let natives = all();
        let clock = natives.iter().find(|n| n.name == "clock").unwrap();
        assert_eq!(clock.arity, 0);

        let first = match (clock.func)(&[]).unwrap() {
            Value::Number(n) => n,
            other => panic!("clock returned {}", other),
        };
        let second = match (clock.func)(&[]).unwrap() {
            Value::Number(n) => n,
            other => panic!("clock returned {}", other),
        };

        assert!(first > 1_000_000_000.0);
        assert!(second >= first);
    }
}
