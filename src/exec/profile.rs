//! Safe-bin profiles: per-utility argument policies.
//!
//! A safe-bin is a utility harmless enough to run unattended when its
//! arguments match a known-safe shape, typically operating on piped
//! input rather than named files. Profiles are data — the decision
//! procedure (deny unknown or ambiguous constructs) is fixed, the
//! per-utility flag sets are operator-tunable.

use super::ExecDenial;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Argument policy for one recognized utility.
///
/// The flag sets partition what the validator knows about: explicitly
/// allowed flags, denied flags, and flags that consume a value (which are
/// implicitly allowed). Any flag outside all three sets is unknown, and
/// unknown is not safe unless `allow_unknown_flags` opts in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SafeBinProfile {
    pub name: String,
    /// `None` means unbounded.
    pub max_positional: Option<usize>,
    /// Most safe-bins are only safe on piped input; utilities that merely
    /// transform path *strings* (`basename`, `echo`) opt in here.
    pub allow_path_positionals: bool,
    pub allow_unknown_flags: bool,
    /// Long flag names stored without the `--` prefix.
    pub allowed_long_flags: BTreeSet<String>,
    pub allowed_short_flags: BTreeSet<char>,
    pub denied_long_flags: BTreeSet<String>,
    pub denied_short_flags: BTreeSet<char>,
    /// Long flags that consume the next token (or an `=`-attached value).
    pub value_long_flags: BTreeSet<String>,
    /// Short flags that consume the rest of their cluster or the next token.
    pub value_short_flags: BTreeSet<char>,
}

impl Default for SafeBinProfile {
    /// The fail-closed profile shape: no positionals tolerated, no flags
    /// known. A partial profile in config inherits these, not openness.
    fn default() -> Self {
        Self {
            name: String::new(),
            max_positional: Some(0),
            allow_path_positionals: false,
            allow_unknown_flags: false,
            allowed_long_flags: BTreeSet::new(),
            allowed_short_flags: BTreeSet::new(),
            denied_long_flags: BTreeSet::new(),
            denied_short_flags: BTreeSet::new(),
            value_long_flags: BTreeSet::new(),
            value_short_flags: BTreeSet::new(),
        }
    }
}

impl SafeBinProfile {
    /// A maximally strict profile: no positionals, no known flags.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn positionals(mut self, max: usize) -> Self {
        self.max_positional = Some(max);
        self
    }

    pub fn positionals_unbounded(mut self) -> Self {
        self.max_positional = None;
        self
    }

    pub fn tolerate_paths(mut self) -> Self {
        self.allow_path_positionals = true;
        self
    }

    pub fn tolerate_unknown_flags(mut self) -> Self {
        self.allow_unknown_flags = true;
        self
    }

    pub fn allow_short(mut self, flags: &str) -> Self {
        self.allowed_short_flags.extend(flags.chars());
        self
    }

    pub fn deny_short(mut self, flags: &str) -> Self {
        self.denied_short_flags.extend(flags.chars());
        self
    }

    pub fn value_short(mut self, flags: &str) -> Self {
        self.value_short_flags.extend(flags.chars());
        self
    }

    pub fn allow_long(mut self, flags: &[&str]) -> Self {
        self.allowed_long_flags
            .extend(flags.iter().map(|f| (*f).to_string()));
        self
    }

    pub fn deny_long(mut self, flags: &[&str]) -> Self {
        self.denied_long_flags
            .extend(flags.iter().map(|f| (*f).to_string()));
        self
    }

    pub fn value_long(mut self, flags: &[&str]) -> Self {
        self.value_long_flags
            .extend(flags.iter().map(|f| (*f).to_string()));
        self
    }

    /// Validate the argument vector (everything after `argv[0]`).
    ///
    /// Purely lexical: never consults the filesystem, so a denied
    /// filesystem-affecting flag is rejected whether or not its target
    /// exists — the flag itself is the hazard.
    pub fn validate_args(&self, args: &[String]) -> Result<(), ExecDenial> {
        let mut positionals: Vec<&str> = Vec::new();
        let mut after_terminator = false;
        let mut i = 0;

        while i < args.len() {
            let token = args[i].as_str();

            if after_terminator || token == "-" || !token.starts_with('-') {
                positionals.push(token);
            } else if token == "--" {
                after_terminator = true;
            } else if let Some(body) = token.strip_prefix("--") {
                i += self.check_long_flag(body, args.get(i + 1).is_some())?;
            } else {
                i += self.check_short_cluster(&token[1..], args.get(i + 1).is_some())?;
            }
            i += 1;
        }

        for arg in &positionals {
            if !self.allow_path_positionals && looks_like_path_argument(arg) {
                return Err(ExecDenial::PathPositional {
                    bin: self.name.clone(),
                    arg: (*arg).to_string(),
                });
            }
        }

        if let Some(max) = self.max_positional {
            if positionals.len() > max {
                return Err(ExecDenial::TooManyPositionals {
                    bin: self.name.clone(),
                    count: positionals.len(),
                    max,
                });
            }
        }

        Ok(())
    }

    /// Check one `--flag` / `--flag=value` token. Returns how many extra
    /// tokens were consumed (0 or 1, for a detached value).
    fn check_long_flag(&self, body: &str, has_next: bool) -> Result<usize, ExecDenial> {
        let (name, attached_value) = match body.split_once('=') {
            Some((n, v)) => (n, Some(v)),
            None => (body, None),
        };

        let resolved = match self.resolve_long_flag(name) {
            LongFlagMatch::Known(flag) => flag,
            LongFlagMatch::Ambiguous => {
                return Err(ExecDenial::AmbiguousFlag {
                    bin: self.name.clone(),
                    flag: format!("--{name}"),
                })
            }
            LongFlagMatch::Unknown => {
                if self.allow_unknown_flags {
                    return Ok(0);
                }
                return Err(ExecDenial::UnknownFlag {
                    bin: self.name.clone(),
                    flag: format!("--{name}"),
                });
            }
        };

        // Denied in both the bare and the value-attached form.
        if self.denied_long_flags.contains(resolved) {
            return Err(ExecDenial::DeniedFlag {
                bin: self.name.clone(),
                flag: format!("--{resolved}"),
            });
        }

        if self.value_long_flags.contains(resolved) && attached_value.is_none() {
            if !has_next {
                return Err(ExecDenial::MissingFlagValue {
                    bin: self.name.clone(),
                    flag: format!("--{resolved}"),
                });
            }
            return Ok(1);
        }

        Ok(0)
    }

    /// Resolve a long flag name, honoring GNU-style unambiguous prefix
    /// abbreviation. An abbreviation that could mean more than one known
    /// flag is never guessed.
    fn resolve_long_flag(&self, name: &str) -> LongFlagMatch<'_> {
        let known = || {
            self.allowed_long_flags
                .iter()
                .chain(&self.denied_long_flags)
                .chain(&self.value_long_flags)
        };

        if let Some(exact) = known().find(|flag| flag.as_str() == name) {
            return LongFlagMatch::Known(exact);
        }
        if name.is_empty() {
            return LongFlagMatch::Unknown;
        }

        let mut prefix_matches = known().filter(|flag| flag.starts_with(name));
        match (prefix_matches.next(), prefix_matches.next()) {
            (Some(only), None) => LongFlagMatch::Known(only),
            (Some(_), Some(_)) => LongFlagMatch::Ambiguous,
            (None, _) => LongFlagMatch::Unknown,
        }
    }

    /// Check a short-flag cluster (`-rn`, `-ovalue`). Returns how many
    /// extra tokens were consumed (a detached value for the last flag).
    fn check_short_cluster(&self, cluster: &str, has_next: bool) -> Result<usize, ExecDenial> {
        let mut chars = cluster.chars();
        while let Some(ch) = chars.next() {
            if self.denied_short_flags.contains(&ch) {
                return Err(ExecDenial::DeniedFlag {
                    bin: self.name.clone(),
                    flag: format!("-{ch}"),
                });
            }
            if self.value_short_flags.contains(&ch) {
                // Rest of the cluster is the attached value (`-ovalue`).
                if chars.next().is_some() {
                    return Ok(0);
                }
                if !has_next {
                    return Err(ExecDenial::MissingFlagValue {
                        bin: self.name.clone(),
                        flag: format!("-{ch}"),
                    });
                }
                return Ok(1);
            }
            if !self.allowed_short_flags.contains(&ch) && !self.allow_unknown_flags {
                return Err(ExecDenial::UnknownFlag {
                    bin: self.name.clone(),
                    flag: format!("-{ch}"),
                });
            }
        }
        Ok(0)
    }
}

enum LongFlagMatch<'a> {
    Known(&'a str),
    Ambiguous,
    Unknown,
}

/// Deny-biased path heuristic for positional arguments. Over-matching is
/// acceptable: a false positive escalates to a human approval, a miss is
/// an arbitrary-file read.
pub(crate) fn looks_like_path_argument(arg: &str) -> bool {
    if arg.is_empty() {
        return false;
    }
    if arg == "." || arg == ".." || arg.starts_with('~') {
        return true;
    }
    if arg.contains('/') || arg.contains('\\') {
        return true;
    }
    // Bare filenames with an extension: `secret.json`, `notes.txt`.
    // Leading-dot tokens (jq filters like `.foo`) and dotted numbers
    // (`1.5`) stay non-paths.
    if !arg.starts_with('.') {
        if let Some((stem, ext)) = arg.rsplit_once('.') {
            if !stem.is_empty()
                && !ext.is_empty()
                && ext.len() <= 10
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
                && !ext.chars().all(|c| c.is_ascii_digit())
            {
                return true;
            }
        }
    }
    false
}

/// Immutable name→profile mapping.
///
/// Built fresh per evaluation configuration; callers compose a derived
/// registry (defaults plus overrides) instead of mutating shared state.
/// An override replaces the whole profile for that name — the explicit
/// escape hatch — so a built-in deny rule can never be weakened
/// piecemeal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SafeBinRegistry {
    profiles: BTreeMap<String, SafeBinProfile>,
}

impl SafeBinRegistry {
    pub fn empty() -> Self {
        Self {
            profiles: BTreeMap::new(),
        }
    }

    /// The built-in profiles for pipe-oriented utilities.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        for profile in builtin_profiles() {
            registry.profiles.insert(profile.name.clone(), profile);
        }
        registry
    }

    /// Derive a registry with caller-supplied profiles layered on top.
    /// Same-name profiles replace the built-in entirely.
    pub fn with_overrides(mut self, overrides: impl IntoIterator<Item = SafeBinProfile>) -> Self {
        for profile in overrides {
            self.profiles.insert(profile.name.clone(), profile);
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&SafeBinProfile> {
        self.profiles.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }
}

impl Default for SafeBinRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn builtin_profiles() -> Vec<SafeBinProfile> {
    vec![
        SafeBinProfile::new("jq")
            .positionals(1)
            .allow_short("rcnesjaSCM")
            .allow_long(&[
                "raw-output",
                "compact-output",
                "null-input",
                "exit-status",
                "slurp",
                "join-output",
                "ascii-output",
                "sort-keys",
                "monochrome-output",
                "color-output",
                "tab",
            ])
            .value_long(&["indent"])
            .deny_short("f")
            .deny_long(&["from-file", "rawfile", "slurpfile", "argfile", "run-tests"]),
        SafeBinProfile::new("grep")
            .positionals(1)
            .allow_short("ivnclLwxEFGPoqsaHh")
            .value_short("eABCm")
            .deny_short("frRDd")
            .allow_long(&[
                "ignore-case",
                "invert-match",
                "line-number",
                "count",
                "word-regexp",
                "line-regexp",
                "extended-regexp",
                "fixed-strings",
                "basic-regexp",
                "perl-regexp",
                "only-matching",
                "quiet",
                "silent",
                "text",
                "no-messages",
                "with-filename",
                "no-filename",
                "files-with-matches",
                "files-without-match",
            ])
            .value_long(&[
                "regexp",
                "max-count",
                "after-context",
                "before-context",
                "context",
                "label",
            ])
            .deny_long(&[
                "file",
                "recursive",
                "dereference-recursive",
                "include",
                "exclude",
                "exclude-from",
                "exclude-dir",
                "directories",
                "devices",
            ]),
        SafeBinProfile::new("sort")
            .allow_short("rnufbghVidszcm")
            .value_short("ktS")
            .deny_short("oT")
            .allow_long(&[
                "reverse",
                "numeric-sort",
                "unique",
                "ignore-case",
                "ignore-leading-blanks",
                "general-numeric-sort",
                "human-numeric-sort",
                "version-sort",
                "dictionary-order",
                "ignore-nonprinting",
                "stable",
                "zero-terminated",
                "check",
                "merge",
                "debug",
            ])
            .value_long(&["key", "field-separator", "buffer-size", "parallel"])
            .deny_long(&[
                "output",
                "files0-from",
                "compress-program",
                "random-source",
                "temporary-directory",
            ]),
        SafeBinProfile::new("uniq")
            .allow_short("cduiz")
            .value_short("fsw")
            .allow_long(&["count", "repeated", "unique", "ignore-case", "zero-terminated"])
            .value_long(&["skip-fields", "skip-chars", "check-chars"]),
        SafeBinProfile::new("head")
            .allow_short("qvz")
            .value_short("nc")
            .allow_long(&["quiet", "silent", "verbose", "zero-terminated"])
            .value_long(&["lines", "bytes"]),
        SafeBinProfile::new("tail")
            .allow_short("qvz")
            .value_short("nc")
            .deny_short("fF")
            .allow_long(&["quiet", "silent", "verbose", "zero-terminated"])
            .value_long(&["lines", "bytes"])
            .deny_long(&["follow", "retry", "pid"]),
        SafeBinProfile::new("wc")
            .allow_short("lwcmL")
            .allow_long(&["lines", "words", "bytes", "chars", "max-line-length"])
            .deny_long(&["files0-from"]),
        SafeBinProfile::new("cut")
            .allow_short("snz")
            .value_short("dfbc")
            .allow_long(&["only-delimited", "complement", "zero-terminated"])
            .value_long(&[
                "delimiter",
                "fields",
                "bytes",
                "characters",
                "output-delimiter",
            ]),
        SafeBinProfile::new("tr").positionals(2).allow_short("dsctC"),
        SafeBinProfile::new("base64")
            .allow_short("di")
            .value_short("w")
            .allow_long(&["decode", "ignore-garbage"])
            .value_long(&["wrap"]),
        SafeBinProfile::new("cat")
            .allow_short("nbsAeEtTvu")
            .allow_long(&[
                "number",
                "number-nonblank",
                "squeeze-blank",
                "show-all",
                "show-ends",
                "show-tabs",
                "show-nonprinting",
            ]),
        SafeBinProfile::new("echo")
            .positionals_unbounded()
            .tolerate_paths()
            .tolerate_unknown_flags()
            .allow_short("neE"),
        SafeBinProfile::new("printf")
            .positionals_unbounded()
            .tolerate_paths(),
        SafeBinProfile::new("date")
            .positionals(1)
            .allow_short("uRI")
            .value_short("d")
            .deny_short("fsr")
            .allow_long(&["utc", "universal", "rfc-email", "rfc-2822", "iso-8601", "debug"])
            .value_long(&["date", "rfc-3339", "resolution"])
            .deny_long(&["file", "reference", "set"]),
        SafeBinProfile::new("basename")
            .positionals(2)
            .tolerate_paths()
            .allow_short("az")
            .value_short("s")
            .allow_long(&["multiple", "zero"])
            .value_long(&["suffix"]),
        SafeBinProfile::new("dirname")
            .positionals_unbounded()
            .tolerate_paths()
            .allow_short("z")
            .allow_long(&["zero"]),
        SafeBinProfile::new("seq")
            .positionals(3)
            .allow_short("w")
            .value_short("sf")
            .allow_long(&["equal-width"])
            .value_long(&["separator", "format"]),
        SafeBinProfile::new("expr").positionals_unbounded().tolerate_paths(),
        SafeBinProfile::new("true"),
        SafeBinProfile::new("false"),
    ]
}
