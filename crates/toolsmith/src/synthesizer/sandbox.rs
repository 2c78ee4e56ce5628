use rhai::module_resolvers::DummyModuleResolver;
use rhai::{Dynamic, Engine, EvalAltResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_MAX_OPERATIONS: u64 = 1_000_000;
pub const DEFAULT_MAX_CALL_DEPTH: usize = 32;
pub const DEFAULT_MAX_STRING_SIZE: usize = 1024 * 1024;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

type HelperResult<T> = Result<T, Box<EvalAltResult>>;

/// What generated scripts may do beyond pure computation.
///
/// Every host helper is denied by default; callers opt in explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxPolicy {
    /// Allows `fetch_url`
    pub allow_network: bool,
    /// Allows `read_file`
    pub allow_fs_read: bool,
    /// Allows `write_file`
    pub allow_fs_write: bool,
    /// Confine file helpers to this directory
    pub fs_root: Option<PathBuf>,
    pub max_operations: u64,
    pub max_call_depth: usize,
    pub max_string_size: usize,
}

impl Default for SandboxPolicy {
    fn default() -> Self {
        Self {
            allow_network: false,
            allow_fs_read: false,
            allow_fs_write: false,
            fs_root: None,
            max_operations: DEFAULT_MAX_OPERATIONS,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            max_string_size: DEFAULT_MAX_STRING_SIZE,
        }
    }
}

impl SandboxPolicy {
    /// Deny every host helper
    pub fn deny_all() -> Self {
        Self::default()
    }

    pub fn with_network(mut self, allow: bool) -> Self {
        self.allow_network = allow;
        self
    }

    /// Allow reading and writing files under `root`
    pub fn with_fs_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.allow_fs_read = true;
        self.allow_fs_write = true;
        self.fs_root = Some(root.into());
        self
    }

    pub fn with_max_operations(mut self, max_operations: u64) -> Self {
        self.max_operations = max_operations;
        self
    }

    /// Resolve a script-supplied path against the policy
    pub fn confine(&self, path: &str) -> Result<PathBuf, String> {
        let requested = Path::new(path);
        if requested
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(format!("path '{}' may not contain '..'", path));
        }

        match &self.fs_root {
            None => Ok(requested.to_path_buf()),
            Some(root) if requested.is_absolute() => {
                if requested.starts_with(root) {
                    Ok(requested.to_path_buf())
                } else {
                    Err(format!(
                        "path '{}' is outside the sandbox root {}",
                        path,
                        root.display()
                    ))
                }
            }
            Some(root) => Ok(root.join(requested)),
        }
    }
}

fn denied(helper: &str) -> Box<EvalAltResult> {
    format!("{} is disabled by the sandbox policy", helper).into()
}

/// Build a script engine limited by `policy`, with the host helpers
/// registered (gated ones fail at call time when denied).
pub fn build_engine(policy: &SandboxPolicy) -> Engine {
    let mut engine = Engine::new();

    engine
        .set_max_operations(policy.max_operations)
        .set_max_call_levels(policy.max_call_depth)
        .set_max_string_size(policy.max_string_size)
        .set_module_resolver(DummyModuleResolver::new());
    engine.disable_symbol("eval");
    engine.disable_symbol("import");

    engine.on_print(|text| tracing::info!(target: "toolsmith::script", "{}", text));
    engine.on_debug(|text, source, pos| {
        tracing::debug!(target: "toolsmith::script", source = ?source, position = %pos, "{}", text)
    });

    engine.register_fn("parse_json", |text: &str| -> HelperResult<Dynamic> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| format!("parse_json: {}", e))?;
        rhai::serde::to_dynamic(value)
    });
    engine.register_fn("to_json", |value: Dynamic| -> HelperResult<String> {
        let value: Value = rhai::serde::from_dynamic(&value)?;
        Ok(value.to_string())
    });

    let allow_network = policy.allow_network;
    engine.register_fn("fetch_url", move |url: &str| -> HelperResult<String> {
        if !allow_network {
            return Err(denied("fetch_url"));
        }
        fetch_url(url).map_err(|e| format!("fetch_url: {}", e).into())
    });

    let read_policy = policy.clone();
    engine.register_fn("read_file", move |path: &str| -> HelperResult<String> {
        if !read_policy.allow_fs_read {
            return Err(denied("read_file"));
        }
        let path = read_policy.confine(path)?;
        std::fs::read_to_string(&path)
            .map_err(|e| format!("read_file {}: {}", path.display(), e).into())
    });

    let write_policy = policy.clone();
    engine.register_fn(
        "write_file",
        move |path: &str, content: &str| -> HelperResult<()> {
            if !write_policy.allow_fs_write {
                return Err(denied("write_file"));
            }
            let path = write_policy.confine(path)?;
            std::fs::write(&path, content)
                .map_err(|e| format!("write_file {}: {}", path.display(), e).into())
        },
    );

    engine
}

/// Blocking GET; scripts always run on a blocking thread
fn fetch_url(url: &str) -> Result<String, reqwest::Error> {
    reqwest::blocking::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .build()?
        .get(url)
        .send()?
        .error_for_status()?
        .text()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn eval(policy: &SandboxPolicy, script: &str) -> Result<Dynamic, String> {
        build_engine(policy)
            .eval::<Dynamic>(script)
            .map_err(|e| e.to_string())
    }

    #[test]
    fn test_default_policy_denies_every_host_helper() {
        // Generated code gets no network or filesystem access unless the
        // embedding application grants it explicitly.
        let policy = SandboxPolicy::default();
        assert!(!policy.allow_network);
        assert!(!policy.allow_fs_read);
        assert!(!policy.allow_fs_write);

        for (helper, script) in [
            ("fetch_url", r#"fetch_url("http://127.0.0.1:1/")"#),
            ("read_file", r#"read_file("/etc/hostname")"#),
            ("write_file", r#"write_file("out.txt", "x")"#),
        ] {
            let err = eval(&policy, script).unwrap_err();
            assert!(
                err.contains(&format!("{} is disabled by the sandbox policy", helper)),
                "unexpected error for {}: {}",
                helper,
                err
            );
        }
    }

    #[test]
    fn test_json_helpers_are_always_available() {
        let policy = SandboxPolicy::default();
        let value = eval(&policy, r#"let v = parse_json("{\"a\": [1, 2]}"); v.a[1]"#).unwrap();
        assert_eq!(value.as_int().unwrap(), 2);

        let text = eval(&policy, r#"to_json([1, "two"])"#).unwrap();
        assert_eq!(text.to_string(), r#"[1,"two"]"#);
    }

    #[test]
    fn test_eval_is_disabled() {
        assert!(eval(&SandboxPolicy::default(), r#"eval("1 + 1")"#).is_err());
    }

    #[test]
    fn test_operation_limit_stops_runaway_scripts() {
        let policy = SandboxPolicy::default().with_max_operations(1_000);
        let err = eval(&policy, "let x = 0; loop { x += 1; }").unwrap_err();
        assert!(err.to_lowercase().contains("operations"), "{}", err);
    }

    #[test]
    fn test_file_helpers_confined_to_root() {
        let dir = tempdir().unwrap();
        let policy = SandboxPolicy::default().with_fs_root(dir.path());

        let written = eval(&policy, r#"write_file("notes.txt", "hello")"#).unwrap();
        assert!(written.is_unit());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("notes.txt")).unwrap(),
            "hello"
        );
        let text = eval(&policy, r#"read_file("notes.txt")"#).unwrap();
        assert_eq!(text.to_string(), "hello");

        let err = eval(&policy, r#"read_file("../secret")"#).unwrap_err();
        assert!(err.contains("may not contain '..'"));
        let err = eval(&policy, r#"read_file("/etc/passwd")"#).unwrap_err();
        assert!(err.contains("outside the sandbox root"));
    }

    #[test]
    fn test_confine_without_root() {
        let policy = SandboxPolicy::default();
        assert_eq!(policy.confine("a/b.txt").unwrap(), PathBuf::from("a/b.txt"));
        assert!(policy.confine("a/../b.txt").is_err());
    }
}
