//! Variable and argument resolver
//!
//! Step fields may reference:
//! - variables: `${VAR}` and `${VAR:-default}`
//! - positional operation arguments: `${1}`, `${2}`, ...
//! - all operation arguments: `${@}`; as a whole argument element it expands
//!   to one element per argument, inside a longer string they are space-joined
//!
//! `$$` escapes a literal `$`. Nothing is ever passed through a shell.

use crate::{ConfigError, Result, Step, StepAction};
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\$|\$\{([^}]+)\}").expect("placeholder pattern is valid"));

const ALL_ARGS: &str = "${@}";

/// Context for resolving variables and arguments
///
/// Built explicitly by the caller; resolution never consults the process
/// environment on its own.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolutionContext {
    vars: BTreeMap<String, String>,
    args: Vec<String>,
}

impl ResolutionContext {
    /// Create an empty resolution context
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or update a variable
    pub fn set_var(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Add or update many variables; later values win
    pub fn extend_vars<I, K, V>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in vars {
            self.set_var(key, value);
        }
    }

    /// Load variables from a dotenv file
    pub fn load_env_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        for item in dotenvy::from_path_iter(path.as_ref())? {
            let (key, value) = item?;
            self.vars.insert(key, value);
        }
        Ok(())
    }

    /// Set the positional operation arguments
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Look up a variable
    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Positional operation arguments
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

/// Resolve all placeholders in a string
pub fn resolve_string(input: &str, context: &ResolutionContext) -> Result<String> {
    let mut missing_vars = Vec::new();
    let mut missing_arg = None;

    let resolved = PLACEHOLDER.replace_all(input, |cap: &Captures<'_>| {
        let Some(expr) = cap.get(1).map(|m| m.as_str()) else {
            // `$$` escape
            return "$".to_string();
        };

        if expr == "@" {
            return context.args.join(" ");
        }

        let (name, default) = match expr.split_once(":-") {
            Some((name, default)) => (name, Some(default)),
            None => (expr, None),
        };

        if let Ok(index) = name.parse::<usize>() {
            let value = index.checked_sub(1).and_then(|i| context.args.get(i));
            return match (value, default) {
                (Some(value), _) => value.clone(),
                (None, Some(default)) => default.to_string(),
                (None, None) => {
                    missing_arg.get_or_insert(index);
                    String::new()
                }
            };
        }

        match (context.vars.get(name), default) {
            (Some(value), _) => value.clone(),
            (None, Some(default)) => default.to_string(),
            (None, None) => {
                missing_vars.push(name.to_string());
                String::new()
            }
        }
    });

    if let Some(index) = missing_arg {
        return Err(ConfigError::ArgumentNotFound {
            index,
            provided: context.args.len(),
        });
    }
    if !missing_vars.is_empty() {
        return Err(ConfigError::EnvVarNotFound(missing_vars.join(", ")));
    }

    Ok(resolved.into_owned())
}

/// Resolve an argument vector, expanding `${@}` elements in place
pub fn resolve_args(args: &[String], context: &ResolutionContext) -> Result<Vec<String>> {
    let mut resolved = Vec::with_capacity(args.len());
    for arg in args {
        if arg == ALL_ARGS {
            resolved.extend(context.args.iter().cloned());
        } else {
            resolved.push(resolve_string(arg, context)?);
        }
    }
    Ok(resolved)
}

fn resolve_opt(value: &Option<String>, context: &ResolutionContext) -> Result<Option<String>> {
    value
        .as_deref()
        .map(|v| resolve_string(v, context))
        .transpose()
}

/// Resolve every string field of a step
pub fn resolve_step(step: &Step, context: &ResolutionContext) -> Result<Step> {
    let action = match &step.action {
        StepAction::Exec {
            args,
            user,
            workdir,
            env,
        } => {
            let mut resolved_env = BTreeMap::new();
            for (key, value) in env {
                resolved_env.insert(key.clone(), resolve_string(value, context)?);
            }
            StepAction::Exec {
                args: resolve_args(args, context)?,
                user: resolve_opt(user, context)?,
                workdir: resolve_opt(workdir, context)?,
                env: resolved_env,
            }
        }
        StepAction::Run { args } => StepAction::Run {
            args: resolve_args(args, context)?,
        },
        StepAction::Host { args } => StepAction::Host {
            args: resolve_args(args, context)?,
        },
        other => other.clone(),
    };

    Ok(Step {
        service: resolve_opt(&step.service, context)?,
        action,
        stdin: resolve_opt(&step.stdin, context)?,
        stdout: resolve_opt(&step.stdout, context)?,
        timeout: step.timeout,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> ResolutionContext {
        let mut context = ResolutionContext::new();
        context.set_var("DB_USER", "admin");
        context.set_var("DB_NAME", "laravel");
        context.with_args(vec!["backup.sql".to_string(), "--force".to_string()])
    }

    #[test]
    fn test_resolve_vars() {
        let context = context();

        assert_eq!(resolve_string("${DB_USER}", &context).unwrap(), "admin");
        assert_eq!(
            resolve_string("mysql://${DB_USER}@db/${DB_NAME}", &context).unwrap(),
            "mysql://admin@db/laravel"
        );
        assert_eq!(
            resolve_string("${DB_PASS:-secret}", &context).unwrap(),
            "secret"
        );
        assert_eq!(
            resolve_string("${DB_USER:-ignored}", &context).unwrap(),
            "admin"
        );
    }

    #[test]
    fn test_missing_var_is_an_error() {
        let err = resolve_string("${NOPE} ${ALSO_NOPE}", &context()).unwrap_err();
        match err {
            ConfigError::EnvVarNotFound(names) => assert_eq!(names, "NOPE, ALSO_NOPE"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_positional_args() {
        let context = context();

        assert_eq!(resolve_string("${1}", &context).unwrap(), "backup.sql");
        assert_eq!(
            resolve_string("dumps/${1}", &context).unwrap(),
            "dumps/backup.sql"
        );
        assert_eq!(
            resolve_string("all: ${@}", &context).unwrap(),
            "all: backup.sql --force"
        );

        let err = resolve_string("${3}", &context).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::ArgumentNotFound {
                index: 3,
                provided: 2
            }
        ));
        assert_eq!(resolve_string("${3:-latest}", &context).unwrap(), "latest");
        assert!(matches!(
            resolve_string("${0}", &context).unwrap_err(),
            ConfigError::ArgumentNotFound { index: 0, .. }
        ));
    }

    #[test]
    fn test_all_args_expand_to_separate_elements() {
        let args = vec![
            "php".to_string(),
            "artisan".to_string(),
            "${@}".to_string(),
        ];

        let resolved = resolve_args(&args, &context()).unwrap();
        assert_eq!(resolved, vec!["php", "artisan", "backup.sql", "--force"]);

        let resolved = resolve_args(&args, &ResolutionContext::new()).unwrap();
        assert_eq!(resolved, vec!["php", "artisan"]);
    }

    #[test]
    fn test_dollar_escape() {
        assert_eq!(
            resolve_string("cost: $$5 for $${HOME}", &context()).unwrap(),
            "cost: $5 for ${HOME}"
        );
    }

    #[test]
    fn test_values_are_not_re_expanded() {
        let mut context = ResolutionContext::new();
        context.set_var("A", "${B}");
        assert_eq!(resolve_string("${A}", &context).unwrap(), "${B}");
    }

    #[test]
    fn test_resolve_step() {
        let step = Step {
            service: Some("mysql".to_string()),
            action: StepAction::Exec {
                args: vec!["mysql".to_string(), "-u${DB_USER}".to_string()],
                user: None,
                workdir: None,
                env: BTreeMap::new(),
            },
            stdin: Some("${1}".to_string()),
            stdout: None,
            timeout: Some(30),
        };

        let resolved = resolve_step(&step, &context()).unwrap();
        assert_eq!(resolved.stdin.as_deref(), Some("backup.sql"));
        assert_eq!(resolved.timeout, Some(30));
        match resolved.action {
            StepAction::Exec { args, .. } => assert_eq!(args, vec!["mysql", "-uadmin"]),
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn test_load_env_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "DB_PASSWORD=hunter2\n# comment\nAPP_ENV=local\n").unwrap();

        let mut context = ResolutionContext::new();
        context.load_env_file(&path).unwrap();

        assert_eq!(context.var("DB_PASSWORD"), Some("hunter2"));
        assert_eq!(context.var("APP_ENV"), Some("local"));
    }
}
