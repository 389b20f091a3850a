use serde::{Deserialize, Serialize};

/// Languages the service knows how to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Javascript,
    Cpp,
    Csharp,
}

/// Everything the sandbox driver needs to launch one language's executor.
///
/// The executor path is the entry point inside the image; it fetches the
/// user's source over `CODE_URL` and runs it (see the executor container
/// contract). Adding a language means adding a row here and publishing the
/// matching image.
#[derive(Debug, Clone, Copy)]
pub struct LanguageSpec {
    pub image: &'static str,
    pub executor_path: &'static str,
}

impl Language {
    pub const ALL: [Language; 4] = [
        Language::Python,
        Language::Javascript,
        Language::Cpp,
        Language::Csharp,
    ];

    pub fn spec(&self) -> LanguageSpec {
        match self {
            Language::Python => LanguageSpec {
                image: "python-executor:latest",
                executor_path: "/app/executor.py",
            },
            Language::Javascript => LanguageSpec {
                image: "javascript-executor:latest",
                executor_path: "/executor/executor.js",
            },
            Language::Cpp => LanguageSpec {
                image: "cpp-executor:latest",
                executor_path: "/app/execute.sh",
            },
            Language::Csharp => LanguageSpec {
                image: "csharp-executor:latest",
                executor_path: "/app/execute.sh",
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Javascript => "javascript",
            Language::Cpp => "cpp",
            Language::Csharp => "csharp",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Language {
    type Err = UnsupportedLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "python" => Ok(Language::Python),
            "javascript" => Ok(Language::Javascript),
            "cpp" => Ok(Language::Cpp),
            "csharp" => Ok(Language::Csharp),
            other => Err(UnsupportedLanguage(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedLanguage(pub String);

impl std::fmt::Display for UnsupportedLanguage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Unsupported language: {}. Supported languages: python, javascript, cpp, csharp",
            self.0
        )
    }
}

impl std::error::Error for UnsupportedLanguage {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn every_language_has_a_spec() {
        for lang in Language::ALL {
            let spec = lang.spec();
            assert!(spec.image.ends_with(":latest"));
            assert!(spec.executor_path.starts_with('/'));
        }
    }

    #[test]
    fn display_round_trips_through_from_str() {
        for lang in Language::ALL {
            let parsed: Language = lang.as_str().parse().unwrap();
            assert_eq!(parsed, lang);
        }
    }

    #[test]
    fn unknown_tags_are_rejected() {
        assert!("rust".parse::<Language>().is_err());
        assert!("Python".parse::<Language>().is_err());
        assert!("".parse::<Language>().is_err());
    }

    #[test]
    fn serde_tag_matches_display() {
        for lang in Language::ALL {
            let json = serde_json::to_string(&lang).unwrap();
            assert_eq!(json, format!("\"{lang}\""));
        }
    }

    #[test]
    fn images_are_distinct_per_runtime() {
        // csharp and cpp share an executor script name but never an image.
        let images: HashSet<_> = Language::ALL.iter().map(|l| l.spec().image).collect();
        assert_eq!(images.len(), Language::ALL.len());
    }
}
