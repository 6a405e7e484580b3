//! Supported languages and how each one is turned into processes.
//!
//! Every [`Language`] maps to a static [`LanguageProfile`] describing the
//! source file extension, the default time budget, and the [`Invocation`]
//! policy the pipeline follows to build and run it.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Fallback time budget when a language declares none.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Fixed name of the executable produced by compile-then-run languages.
pub const COMPILED_ARTIFACT_NAME: &str = "temp_executable";

/// Class name used when no `public class` declaration is found.
pub const FALLBACK_ENTRY_POINT: &str = "Main";

/// Source file name used inside a synthesized project directory.
pub const PROJECT_SOURCE_NAME: &str = "Program";

/// Project descriptor written next to the source for project builds.
pub const PROJECT_DESCRIPTOR_NAME: &str = "project.csproj";

const PROJECT_DESCRIPTOR: &str = r#"<Project Sdk="Microsoft.NET.Sdk">
  <PropertyGroup>
    <OutputType>Exe</OutputType>
    <TargetFramework>net6.0</TargetFramework>
    <ImplicitUsings>enable</ImplicitUsings>
  </PropertyGroup>
</Project>
"#;

static PUBLIC_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"public\s+(?:final\s+|abstract\s+)?class\s+([A-Za-z_$][A-Za-z0-9_$]*)")
        .expect("valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    JavaScript,
    TypeScript,
    Python,
    Java,
    CSharp,
    Cpp,
    Ruby,
    Php,
    Swift,
    Go,
    Rust,
}

/// How source code of a language is turned into a running process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invocation {
    /// `program [args..] <source>`.
    Interpret {
        program: &'static str,
        args: &'static [&'static str],
    },
    /// `compiler <source> -o <dir>/temp_executable`, then run the artifact.
    CompileThenRun { compiler: &'static str },
    /// Rename the source after its declared class, compile it, and run the
    /// class by name from the staging directory.
    InferredEntryPoint {
        compiler: &'static str,
        runtime: &'static str,
    },
    /// Write a project descriptor beside the source and hand the directory
    /// to a build-and-run tool.
    ProjectBuild { program: &'static str },
}

#[derive(Debug, Clone, Copy)]
pub struct LanguageProfile {
    pub extension: &'static str,
    pub invocation: Invocation,
    pub default_timeout_ms: u64,
}

impl Language {
    /// All supported languages, in the order they are documented.
    pub fn all_variants() -> &'static [Language] {
        &[
            Language::JavaScript,
            Language::TypeScript,
            Language::Python,
            Language::Java,
            Language::CSharp,
            Language::Cpp,
            Language::Ruby,
            Language::Php,
            Language::Swift,
            Language::Go,
            Language::Rust,
        ]
    }

    /// Parse a language identifier (case-insensitive).
    pub fn parse(s: &str) -> Option<Language> {
        let lowered = s.trim().to_lowercase();
        Self::all_variants()
            .iter()
            .copied()
            .find(|lang| lang.as_str() == lowered)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Python => "python",
            Language::Java => "java",
            Language::CSharp => "csharp",
            Language::Cpp => "cpp",
            Language::Ruby => "ruby",
            Language::Php => "php",
            Language::Swift => "swift",
            Language::Go => "go",
            Language::Rust => "rust",
        }
    }

    pub fn profile(&self) -> LanguageProfile {
        match self {
            Language::JavaScript => LanguageProfile {
                extension: "js",
                invocation: Invocation::Interpret {
                    program: "node",
                    args: &["--max-old-space-size=100"],
                },
                default_timeout_ms: 5_000,
            },
            Language::TypeScript => LanguageProfile {
                extension: "ts",
                invocation: Invocation::Interpret {
                    program: "ts-node",
                    args: &[],
                },
                default_timeout_ms: 5_000,
            },
            // The program is replaced by the configured or environment
            // interpreter before dispatch.
            Language::Python => LanguageProfile {
                extension: "py",
                invocation: Invocation::Interpret {
                    program: "python3",
                    args: &["-u"],
                },
                default_timeout_ms: 5_000,
            },
            Language::Java => LanguageProfile {
                extension: "java",
                invocation: Invocation::InferredEntryPoint {
                    compiler: "javac",
                    runtime: "java",
                },
                default_timeout_ms: 10_000,
            },
            Language::CSharp => LanguageProfile {
                extension: "cs",
                invocation: Invocation::ProjectBuild { program: "dotnet" },
                default_timeout_ms: 8_000,
            },
            Language::Cpp => LanguageProfile {
                extension: "cpp",
                invocation: Invocation::CompileThenRun { compiler: "g++" },
                default_timeout_ms: 8_000,
            },
            Language::Ruby => LanguageProfile {
                extension: "rb",
                invocation: Invocation::Interpret {
                    program: "ruby",
                    args: &[],
                },
                default_timeout_ms: 5_000,
            },
            Language::Php => LanguageProfile {
                extension: "php",
                invocation: Invocation::Interpret {
                    program: "php",
                    args: &[],
                },
                default_timeout_ms: 5_000,
            },
            Language::Swift => LanguageProfile {
                extension: "swift",
                invocation: Invocation::Interpret {
                    program: "swift",
                    args: &[],
                },
                default_timeout_ms: 8_000,
            },
            Language::Go => LanguageProfile {
                extension: "go",
                invocation: Invocation::Interpret {
                    program: "go",
                    args: &["run"],
                },
                default_timeout_ms: 5_000,
            },
            Language::Rust => LanguageProfile {
                extension: "rs",
                invocation: Invocation::CompileThenRun { compiler: "rustc" },
                default_timeout_ms: 8_000,
            },
        }
    }

    /// The binary that must be on `PATH` for this language to run at all.
    pub fn toolchain_binary(&self) -> &'static str {
        match self.profile().invocation {
            Invocation::Interpret { program, .. } => program,
            Invocation::CompileThenRun { compiler } => compiler,
            Invocation::InferredEntryPoint { compiler, .. } => compiler,
            Invocation::ProjectBuild { program } => program,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Best-effort guess of the class a Java source must be compiled as.
///
/// Takes the first `public class` declaration. Sources without one fall
/// back to [`FALLBACK_ENTRY_POINT`]; if the real class is named differently
/// the compiler or the runtime rejects it and the request fails normally.
/// Nested or commented-out declarations can fool the match.
pub fn infer_entry_point(code: &str) -> String {
    PUBLIC_CLASS_RE
        .captures(code)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| FALLBACK_ENTRY_POINT.to_string())
}

/// Contents of the project descriptor written for project builds.
pub fn project_descriptor() -> &'static str {
    PROJECT_DESCRIPTOR
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_string(&Language::CSharp).unwrap();
        assert_eq!(json, "\"csharp\"");
        let lang: Language = serde_json::from_str("\"javascript\"").unwrap();
        assert_eq!(lang, Language::JavaScript);
    }

    #[test]
    fn as_str_matches_serde_name() {
        for lang in Language::all_variants() {
            let json = serde_json::to_string(lang).unwrap();
            assert_eq!(json, format!("\"{}\"", lang.as_str()));
        }
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(Language::parse("Python"), Some(Language::Python));
        assert_eq!(Language::parse("RUST"), Some(Language::Rust));
        assert_eq!(Language::parse("cobol"), None);
        assert_eq!(Language::parse(""), None);
    }

    #[test]
    fn eleven_languages_supported() {
        assert_eq!(Language::all_variants().len(), 11);
    }

    #[test]
    fn default_timeouts_fall_within_request_bounds() {
        for lang in Language::all_variants() {
            let ms = lang.profile().default_timeout_ms;
            assert!((1_000..=30_000).contains(&ms), "{lang} default {ms}ms");
        }
    }

    #[test]
    fn policies_match_languages() {
        assert!(matches!(
            Language::Java.profile().invocation,
            Invocation::InferredEntryPoint { .. }
        ));
        assert!(matches!(
            Language::CSharp.profile().invocation,
            Invocation::ProjectBuild { .. }
        ));
        assert!(matches!(
            Language::Rust.profile().invocation,
            Invocation::CompileThenRun { compiler: "rustc" }
        ));
        assert!(matches!(
            Language::Go.profile().invocation,
            Invocation::Interpret { program: "go", args: ["run"] }
        ));
    }

    #[test]
    fn infers_public_class_name() {
        let code = "import java.util.*;\n\npublic class HelloWorld {\n  public static void main(String[] a) {}\n}";
        assert_eq!(infer_entry_point(code), "HelloWorld");
    }

    #[test]
    fn infers_final_public_class() {
        assert_eq!(infer_entry_point("public final class Solver {}"), "Solver");
    }

    #[test]
    fn falls_back_without_public_class() {
        assert_eq!(infer_entry_point("class Hidden {}"), FALLBACK_ENTRY_POINT);
    }

    #[test]
    fn project_descriptor_is_executable_sdk_project() {
        let descriptor = project_descriptor();
        assert!(descriptor.contains("Microsoft.NET.Sdk"));
        assert!(descriptor.contains("<OutputType>Exe</OutputType>"));
    }
}
