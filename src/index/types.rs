use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Symbol category encoded in a shard name prefix (`classes_13` -> Classes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
#[repr(u16)]
pub enum Section {
    All = 0,
    Classes = 1,
    Namespaces = 2,
    Files = 3,
    Functions = 4,
    Variables = 5,
    Typedefs = 6,
    Enums = 7,
    EnumValues = 8,
    Related = 9,
    Defines = 10,
    Groups = 11,
    Pages = 12,
    Concepts = 13,
    #[default]
    Other = 14,
}

impl Section {
    pub const ALL: [Section; 15] = [
        Section::All,
        Section::Classes,
        Section::Namespaces,
        Section::Files,
        Section::Functions,
        Section::Variables,
        Section::Typedefs,
        Section::Enums,
        Section::EnumValues,
        Section::Related,
        Section::Defines,
        Section::Groups,
        Section::Pages,
        Section::Concepts,
        Section::Other,
    ];

    pub fn from_prefix(prefix: &str) -> Self {
        match prefix.to_ascii_lowercase().as_str() {
            "all" => Section::All,
            "classes" | "class" => Section::Classes,
            "namespaces" | "namespace" => Section::Namespaces,
            "files" | "file" => Section::Files,
            "functions" | "function" => Section::Functions,
            "variables" | "variable" => Section::Variables,
            "typedefs" | "typedef" => Section::Typedefs,
            "enums" | "enum" => Section::Enums,
            "enumvalues" | "enumvalue" => Section::EnumValues,
            "related" => Section::Related,
            "defines" | "define" => Section::Defines,
            "groups" | "group" => Section::Groups,
            "pages" | "page" => Section::Pages,
            "concepts" | "concept" => Section::Concepts,
            _ => Section::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Section::All => "all",
            Section::Classes => "classes",
            Section::Namespaces => "namespaces",
            Section::Files => "files",
            Section::Functions => "functions",
            Section::Variables => "variables",
            Section::Typedefs => "typedefs",
            Section::Enums => "enums",
            Section::EnumValues => "enumvalues",
            Section::Related => "related",
            Section::Defines => "defines",
            Section::Groups => "groups",
            Section::Pages => "pages",
            Section::Concepts => "concepts",
            Section::Other => "other",
        }
    }

    #[inline]
    fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Section {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match Section::from_prefix(s) {
            Section::Other if !s.eq_ignore_ascii_case("other") => {
                Err(format!("unknown section '{}'", s))
            }
            section => Ok(section),
        }
    }
}

/// Set of sections a reference was seen in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectionSet(pub u16);

impl SectionSet {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn single(section: Section) -> Self {
        Self(section.bit())
    }

    pub fn insert(&mut self, section: Section) {
        self.0 |= section.bit();
    }

    pub fn union(&mut self, other: SectionSet) {
        self.0 |= other.0;
    }

    pub fn contains(&self, section: Section) -> bool {
        self.0 & section.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Section> + '_ {
        Section::ALL.into_iter().filter(|s| self.contains(*s))
    }
}

impl fmt::Display for SectionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(|s| s.as_str()).collect();
        f.write_str(&names.join(","))
    }
}

/// Parsed shard name: `classes_13` -> (Classes, Some("13"))
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShardName {
    pub raw: String,
    pub section: Section,
    pub bucket: Option<String>,
}

impl ShardName {
    pub fn parse(raw: &str) -> Self {
        let (section, bucket) = match raw.rsplit_once('_') {
            Some((prefix, bucket))
                if !bucket.is_empty() && bucket.bytes().all(|b| b.is_ascii_hexdigit()) =>
            {
                (Section::from_prefix(prefix), Some(bucket.to_string()))
            }
            _ => (Section::from_prefix(raw), None),
        };

        Self {
            raw: raw.to_string(),
            section,
            bucket,
        }
    }

    /// Shard name for a file: its stem (`search/classes_13.js` -> `classes_13`)
    pub fn from_path(path: &Path) -> Option<Self> {
        path.file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .map(Self::parse)
    }
}

impl fmt::Display for ShardName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// One documentation-anchor association for a token
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Reference {
    pub display_label: String,
    pub anchor_url: String,
    pub scope_description: String,
    /// Generator flag: open the anchor in the parent frame
    #[serde(default)]
    pub parent_target: bool,
}

impl Reference {
    /// Identity used for de-duplication across shards
    pub fn key(&self) -> (&str, &str, &str) {
        (&self.display_label, &self.anchor_url, &self.scope_description)
    }

    /// Resolve the anchor against the directory the shard was loaded from.
    /// Absolute URLs are returned unchanged.
    pub fn resolve(&self, search_dir: &Path) -> String {
        resolve_anchor(&self.anchor_url, search_dir)
    }
}

/// Resolve a (possibly relative) anchor URL against a search directory
pub fn resolve_anchor(url: &str, search_dir: &Path) -> String {
    if url.contains("://") || url.starts_with('/') || url.starts_with("mailto:") {
        return url.to_string();
    }

    let (path_part, fragment) = match url.split_once('#') {
        Some((p, f)) => (p, Some(f)),
        None => (url, None),
    };

    let mut dir = search_dir.to_path_buf();
    let mut rest = path_part;
    loop {
        if let Some(stripped) = rest.strip_prefix("../") {
            dir = dir.parent().map(Path::to_path_buf).unwrap_or(dir);
            rest = stripped;
        } else if let Some(stripped) = rest.strip_prefix("./") {
            rest = stripped;
        } else {
            break;
        }
    }

    let joined = if rest.is_empty() { dir } else { dir.join(rest) };
    let mut resolved = format!("file://{}", joined.display());
    if let Some(fragment) = fragment {
        resolved.push('#');
        resolved.push_str(fragment);
    }
    resolved
}

/// One record of a shard: a token and the references it maps to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub token: String,
    /// Display name of the symbol (entities decoded)
    pub name: String,
    /// Uniqueness suffix from the generated key; never used for lookup
    pub ordinal: Option<u32>,
    pub occurrences: Vec<Reference>,
}

/// A named bucket of index entries, as produced by one generated file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexShard {
    pub name: ShardName,
    pub entries: Vec<IndexEntry>,
}

impl IndexShard {
    pub fn section(&self) -> Section {
        self.name.section
    }

    pub fn reference_count(&self) -> usize {
        self.entries.iter().map(|e| e.occurrences.len()).sum()
    }
}
