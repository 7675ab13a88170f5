//! Output-language hints and the extension table used in `Auto` mode.

use std::fmt;
use std::str::FromStr;

/// Languages the completion engine can be told to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    CSharp,
    CSharpScript,
    Json,
    Xml,
    Yaml,
    Markdown,
    TypeScript,
    JavaScript,
    Java,
    Kotlin,
    Sql,
    PlainText,
}

impl Language {
    pub const ALL: [Language; 12] = [
        Self::CSharp,
        Self::CSharpScript,
        Self::Json,
        Self::Xml,
        Self::Yaml,
        Self::Markdown,
        Self::TypeScript,
        Self::JavaScript,
        Self::Java,
        Self::Kotlin,
        Self::Sql,
        Self::PlainText,
    ];

    /// Infer the language from a file's extension; unknown extensions map to
    /// [`Language::PlainText`].
    pub fn from_path(rel_path: &str) -> Self {
        let file_name = rel_path.rsplit(['/', '\\']).next().unwrap_or(rel_path);
        let ext = match file_name.rsplit_once('.') {
            Some((_, ext)) => ext.to_ascii_lowercase(),
            None => return Self::PlainText,
        };
        match ext.as_str() {
            "cs" => Self::CSharp,
            "csx" => Self::CSharpScript,
            "json" => Self::Json,
            "xml" | "csproj" | "props" | "targets" => Self::Xml,
            "yml" | "yaml" => Self::Yaml,
            "md" => Self::Markdown,
            "ts" | "tsx" => Self::TypeScript,
            "js" => Self::JavaScript,
            "java" => Self::Java,
            "kt" | "kts" => Self::Kotlin,
            "sql" => Self::Sql,
            _ => Self::PlainText,
        }
    }

    /// Human-readable name, as sent in the prompt.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::CSharp => "C#",
            Self::CSharpScript => "C# script",
            Self::Json => "JSON",
            Self::Xml => "XML",
            Self::Yaml => "YAML",
            Self::Markdown => "Markdown",
            Self::TypeScript => "TypeScript",
            Self::JavaScript => "JavaScript",
            Self::Java => "Java",
            Self::Kotlin => "Kotlin",
            Self::Sql => "SQL",
            Self::PlainText => "Plain text",
        }
    }

    /// Short identifier accepted on the command line and in config files.
    pub fn key(&self) -> &'static str {
        match self {
            Self::CSharp => "csharp",
            Self::CSharpScript => "csharp-script",
            Self::Json => "json",
            Self::Xml => "xml",
            Self::Yaml => "yaml",
            Self::Markdown => "markdown",
            Self::TypeScript => "typescript",
            Self::JavaScript => "javascript",
            Self::Java => "java",
            Self::Kotlin => "kotlin",
            Self::Sql => "sql",
            Self::PlainText => "plain",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Language {
    type Err = String;

    /// Accepts either the display name (`C#`, `Plain text`) or the key
    /// (`csharp`, `plain`), case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|l| {
                l.display_name().eq_ignore_ascii_case(needle)
                    || l.key().eq_ignore_ascii_case(needle)
            })
            .ok_or_else(|| format!("unknown language '{}'", needle))
    }
}
