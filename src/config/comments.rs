//! Comment-preserving YAML round-trip (§4.G).
//!
//! No crate in the dependency stack parses YAML while retaining comments,
//! so this is a text-layer pass on top of `serde_yaml`: scan the raw file
//! once to record each run of comment lines against the dotted key path it
//! precedes, then re-splice those comment blocks into freshly marshaled
//! YAML at the matching path. Comments attached to keys that no longer
//! exist in the output are dropped; keys with no recorded comments marshal
//! without one.

use std::collections::HashMap;

use crate::error::{EngineError, EngineResult};

/// Comments keyed by the dotted path of the mapping key they precede
/// (e.g. `"database.host"`, `"usecases.cars.old-parking-method-delay"`).
/// The root document's leading comments (before any key) are stored under
/// the empty path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommentTree(HashMap<String, Vec<String>>);

impl CommentTree {
    pub fn get(&self, path: &str) -> Option<&[String]> {
        self.0.get(path).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Scan raw YAML text, recording each contiguous run of `#`-comment
    /// lines against the dotted path of the mapping key immediately
    /// following it. Only top-level indentation nesting is tracked — this
    /// mirrors the flat, shallow shape of the config tree it serves.
    pub fn scan(source: &str) -> Self {
        let mut tree = HashMap::new();
        let mut pending: Vec<String> = Vec::new();
        let mut path_stack: Vec<(usize, String)> = Vec::new();

        for raw_line in source.lines() {
            let trimmed = raw_line.trim_start();
            let indent = raw_line.len() - trimmed.len();

            if trimmed.is_empty() {
                continue;
            }
            if trimmed.starts_with('#') {
                pending.push(trimmed.to_string());
                continue;
            }

            let Some((key_part, _)) = trimmed.split_once(':') else {
                pending.clear();
                continue;
            };
            let key = key_part.trim().trim_matches('"').to_string();

            while path_stack
                .last()
                .is_some_and(|(depth, _)| *depth >= indent)
            {
                path_stack.pop();
            }

            let path = if let Some((_, parent)) = path_stack.last() {
                format!("{parent}.{key}")
            } else {
                key.clone()
            };

            if !pending.is_empty() {
                tree.insert(path.clone(), std::mem::take(&mut pending));
            }

            path_stack.push((indent, path));
        }

        CommentTree(tree)
    }

    /// Re-insert recorded comment blocks ahead of their matching keys in
    /// freshly marshaled YAML. A key with no recorded comments is emitted
    /// unchanged.
    pub fn splice(&self, marshaled: &str) -> String {
        let mut out = String::with_capacity(marshaled.len());
        let mut path_stack: Vec<(usize, String)> = Vec::new();

        for raw_line in marshaled.lines() {
            let trimmed = raw_line.trim_start();
            let indent = raw_line.len() - trimmed.len();

            if let Some((key_part, _)) = trimmed.split_once(':') {
                let key = key_part.trim().trim_matches('"').to_string();

                while path_stack
                    .last()
                    .is_some_and(|(depth, _)| *depth >= indent)
                {
                    path_stack.pop();
                }

                let path = if let Some((_, parent)) = path_stack.last() {
                    format!("{parent}.{key}")
                } else {
                    key.clone()
                };

                if let Some(comments) = self.get(&path) {
                    let pad = " ".repeat(indent);
                    for comment in comments {
                        out.push_str(&pad);
                        out.push_str(comment);
                        out.push('\n');
                    }
                }

                path_stack.push((indent, path));
            }

            out.push_str(raw_line);
            out.push('\n');
        }

        out
    }
}

pub fn validate_utf8(bytes: &[u8]) -> EngineResult<&str> {
    std::str::from_utf8(bytes)
        .map_err(|e| EngineError::InvalidInput(format!("config file is not valid UTF-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
versions:
  config: 2.1.0
  # database major moved independently of config major
  database: 1.0.0
database:
  host: db.example
usecases:
  cars:
    # inherited from the source's old-parking-method-delay
    delay-of-old-parking-method: 2s
";

    #[test]
    fn scan_attaches_comments_to_the_following_key() {
        let tree = CommentTree::scan(SAMPLE);
        assert_eq!(
            tree.get("versions.database"),
            Some(["# database major moved independently of config major".to_string()].as_slice())
        );
        assert_eq!(
            tree.get("usecases.cars.delay-of-old-parking-method"),
            Some(["# inherited from the source's old-parking-method-delay".to_string()].as_slice())
        );
    }

    #[test]
    fn keys_without_comments_have_no_entry() {
        let tree = CommentTree::scan(SAMPLE);
        assert!(tree.get("database.host").is_none());
    }

    #[test]
    fn splice_reinserts_comments_at_the_matching_path() {
        let tree = CommentTree::scan(SAMPLE);
        let marshaled = "versions:\n  config: 2.1.0\n  database: 1.0.0\n";
        let spliced = tree.splice(marshaled);
        assert!(spliced.contains("# database major moved independently of config major\n  database: 1.0.0"));
    }

    #[test]
    fn splice_drops_comments_for_keys_absent_from_the_output() {
        let tree = CommentTree::scan(SAMPLE);
        let marshaled = "versions:\n  config: 2.1.0\n";
        let spliced = tree.splice(marshaled);
        assert!(!spliced.contains("database major moved independently"));
    }
}
