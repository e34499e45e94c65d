//! Built-in computations shipped with the `smpmap` binary.
//!
//! They double as worker-side registrations: the binary calls
//! [`registry`]`().serve_if_worker()` before anything else, so any of these
//! can be mapped with the default launcher (re-executing the binary).

use crate::computation::Computation;
#[cfg(unix)]
use crate::worker::WorkerRegistry;
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;
use std::io::Write;
use std::thread;
use std::time::Duration;

/// Name and one-line summary of a built-in computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskInfo {
    pub name: &'static str,
    pub summary: &'static str,
    /// Shape of one input, as JSON.
    pub input: &'static str,
}

/// Every built-in computation, in listing order.
pub const BUILTINS: &[TaskInfo] = &[
    TaskInfo {
        name: "sine",
        summary: "sin(x), optionally after sleeping delay_ms",
        input: r#"{"x": 1.0, "delay_ms": 0}"#,
    },
    TaskInfo {
        name: "integrate",
        summary: "|integral of cos(i*t) over [0, pi/2]| by Riemann sum, printing progress",
        input: "3",
    },
    TaskInfo {
        name: "sqrt",
        summary: "square root, failing on negative input",
        input: "2.0",
    },
    TaskInfo {
        name: "crash",
        summary: "misbehaves on purpose: abort, exit, panic or survive",
        input: r#""abort" | {"exit": {"code": 3}} | {"panic": {"message": "boom"}} | {"survive": {"value": 7}}"#,
    },
];

/// Registry of every built-in, for worker mode.
#[cfg(unix)]
pub fn registry() -> WorkerRegistry {
    WorkerRegistry::new()
        .register(Sine)
        .register(Integrate::default())
        .register(Sqrt)
        .register(Crash)
}

/// Input to [`Sine`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SineInput {
    pub x: f64,
    /// Artificial latency before answering.
    #[serde(default)]
    pub delay_ms: u64,
}

impl SineInput {
    pub fn new(x: f64) -> Self {
        Self { x, delay_ms: 0 }
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }
}

/// `sin(x)`, optionally slowed down to shape completion order.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sine;

impl Computation for Sine {
    type Input = SineInput;
    type Output = f64;
    type Error = std::convert::Infallible;

    fn name(&self) -> &str {
        "sine"
    }

    fn call(&self, input: SineInput) -> Result<f64, Self::Error> {
        if input.delay_ms > 0 {
            thread::sleep(Duration::from_millis(input.delay_ms));
        }
        Ok(input.x.sin())
    }
}

/// Left Riemann sum of `cos(i*t)` over `[0, pi/2]`.
///
/// Prints `"<i>: "`, pauses, then `"S=<value>"`, so the two halves of each
/// worker's output would interleave if it were not captured.
#[derive(Debug, Clone, Copy)]
pub struct Integrate {
    pub steps: u32,
    pub pause: Duration,
}

impl Default for Integrate {
    fn default() -> Self {
        Self {
            steps: 800_000,
            pause: Duration::from_millis(50),
        }
    }
}

impl Integrate {
    /// `|h * sum_{j<n} cos(i*j*h)|` with `h = pi/2 / n`.
    pub fn area(&self, i: u32) -> f64 {
        let n = self.steps.max(1);
        let h = FRAC_PI_2 / f64::from(n);
        let i = f64::from(i);
        let sum: f64 = (0..n).map(|j| (i * f64::from(j) * h).cos()).sum();
        (sum * h).abs()
    }
}

impl Computation for Integrate {
    type Input = u32;
    type Output = f64;
    type Error = std::io::Error;

    fn name(&self) -> &str {
        "integrate"
    }

    fn call(&self, i: u32) -> Result<f64, Self::Error> {
        let mut stdout = std::io::stdout();
        write!(stdout, "{}: ", i)?;
        stdout.flush()?;
        let s = self.area(i);
        thread::sleep(self.pause);
        writeln!(stdout, "S={:.2}", s)?;
        Ok(s)
    }
}

/// Square root of a non-negative number.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sqrt;

impl Computation for Sqrt {
    type Input = f64;
    type Output = f64;
    type Error = String;

    fn name(&self) -> &str {
        "sqrt"
    }

    fn call(&self, x: f64) -> Result<f64, String> {
        if x < 0.0 {
            return Err(format!("cannot take the square root of {}", x));
        }
        Ok(x.sqrt())
    }
}

/// How [`Crash`] should misbehave.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrashMode {
    /// Die from SIGABRT without writing a frame.
    Abort,
    /// Exit with `code` without writing a frame.
    Exit { code: i32 },
    /// Panic with `message`.
    Panic { message: String },
    /// Behave and return `value`.
    Survive { value: i64 },
}

/// Exercises abnormal worker termination.
#[derive(Debug, Clone, Copy, Default)]
pub struct Crash;

impl Computation for Crash {
    type Input = CrashMode;
    type Output = i64;
    type Error = std::convert::Infallible;

    fn name(&self) -> &str {
        "crash"
    }

    fn call(&self, mode: CrashMode) -> Result<i64, Self::Error> {
        match mode {
            CrashMode::Abort => std::process::abort(),
            CrashMode::Exit { code } => std::process::exit(code),
            CrashMode::Panic { message } => panic!("{}", message),
            CrashMode::Survive { value } => Ok(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sine_without_delay() {
        let value = Sine.call(SineInput::new(FRAC_PI_2)).unwrap();
        assert!((value - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_sine_input_delay_defaults_to_zero() {
        let input: SineInput = serde_json::from_str(r#"{"x": 0.5}"#).unwrap();
        assert_eq!(input, SineInput::new(0.5));
    }

    #[test]
    fn test_integrate_matches_closed_form() {
        let integrate = Integrate {
            steps: 100_000,
            pause: Duration::ZERO,
        };
        for i in 1..=10u32 {
            let expected = ((f64::from(i) * FRAC_PI_2).sin() / f64::from(i)).abs();
            let got = integrate.area(i);
            assert!((got - expected).abs() < 1e-3, "i={} got={} expected={}", i, got, expected);
        }
    }

    #[test]
    fn test_integrate_zero_is_quarter_turn() {
        let integrate = Integrate {
            steps: 1_000,
            pause: Duration::ZERO,
        };
        assert!((integrate.area(0) - FRAC_PI_2).abs() < 1e-9);
    }

    #[test]
    fn test_sqrt_negative_fails() {
        assert_eq!(Sqrt.call(9.0), Ok(3.0));
        let err = Sqrt.call(-4.0).unwrap_err();
        assert!(err.contains("-4"));
    }

    #[test]
    fn test_crash_mode_json_shapes() {
        assert_eq!(
            serde_json::from_str::<CrashMode>(r#""abort""#).unwrap(),
            CrashMode::Abort
        );
        assert_eq!(
            serde_json::from_str::<CrashMode>(r#"{"exit": {"code": 3}}"#).unwrap(),
            CrashMode::Exit { code: 3 }
        );
        assert_eq!(Crash.call(CrashMode::Survive { value: 7 }).unwrap(), 7);
    }

    #[cfg(unix)]
    #[test]
    fn test_registry_matches_listing() {
        let registry = registry();
        let names: Vec<&str> = registry.names().collect();
        let listed: Vec<&str> = BUILTINS.iter().map(|info| info.name).collect();
        assert_eq!(names, listed);
    }
}
