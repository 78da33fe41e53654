//! Filename encoding between user-visible names and on-disk names
//!
//! Node directories and attached files share one directory namespace. Node
//! directories never start with [`PREFIX`], so quoting an attached file with
//! the prefix always moves it out of their way:
//!
//! ```text
//! on disk          visible
//! filename     =>  filename
//! __filename   =>  filename
//! ____filename =>  __filename
//! ```
//!
//! Within an attached sub-directory names map 1-to-1; only the first path
//! component of an attached file is encoded.

use std::borrow::Cow;

/// Reserved two-character quoting prefix.
pub const PREFIX: &str = "__";

/// Node attribute file kept in every node directory.
pub const NODE_META_FILE: &str = "node.json";

/// Scratch file used while rewriting [`NODE_META_FILE`].
pub const NODE_META_TMP: &str = "node.json.tmp";

/// What currently occupies a name inside a node directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Missing,
    /// Plain attached file or attached directory.
    Attached,
    /// Sub-node directory.
    NodeDir,
}

/// Decode an on-disk name into its visible form.
pub fn decode(on_disk: &str) -> &str {
    on_disk.strip_prefix(PREFIX).unwrap_or(on_disk)
}

/// Encode a visible name without consulting the disk.
///
/// Only names that already start with the prefix are quoted.
pub fn encode(visible: &str) -> Cow<'_, str> {
    if visible.starts_with(PREFIX) {
        Cow::Owned(quote(visible))
    } else {
        Cow::Borrowed(visible)
    }
}

/// Unconditionally quote a visible name.
pub fn quote(visible: &str) -> String {
    format!("{PREFIX}{visible}")
}

/// Names the store keeps for itself inside node directories.
pub fn is_reserved(name: &str) -> bool {
    name == NODE_META_FILE || name == NODE_META_TMP
}

/// Whether `name` may be used as a node directory name.
pub fn is_valid_node_dirname(name: &str) -> bool {
    !name.is_empty() && !name.starts_with(PREFIX) && !is_reserved(name)
}

/// Resolve the on-disk name for a visible attached-file name.
///
/// `probe` reports what occupies a given on-disk name in the node directory.
pub fn to_disk<F>(visible: &str, probe: F) -> String
where
    F: Fn(&str) -> EntryKind,
{
    if visible.is_empty() {
        return String::new();
    }
    if visible.starts_with(PREFIX) || is_reserved(visible) {
        return quote(visible);
    }
    match probe(visible) {
        EntryKind::Attached => visible.to_string(),
        EntryKind::NodeDir => quote(visible),
        EntryKind::Missing => {
            let quoted = quote(visible);
            if probe(&quoted) == EntryKind::Attached {
                quoted
            } else {
                visible.to_string()
            }
        }
    }
}

/// Split an attached-file path into its first component and the remainder.
pub fn split_first(filename: &str) -> (&str, Option<&str>) {
    let trimmed = filename.trim_start_matches('/');
    match trimmed.split_once('/') {
        Some((head, rest)) if !rest.is_empty() => (head, Some(rest)),
        Some((head, _)) => (head, None),
        None => (trimmed, None),
    }
}

/// Join node-file path parts with `/`, skipping leading empty parts.
pub fn path_join(parts: &[&str]) -> String {
    let start = parts
        .iter()
        .position(|p| !p.is_empty())
        .unwrap_or(parts.len());
    parts[start..].join("/")
}

/// Last component of a node-file path, ignoring one trailing separator.
///
/// `aaa/bbb` and `aaa/bbb/` both give `bbb`; `/` and `` give ``.
pub fn path_basename(filename: &str) -> &str {
    let trimmed = filename.strip_suffix('/').unwrap_or(filename);
    match trimmed.rfind('/') {
        Some(i) => &trimmed[i + 1..],
        None => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn nothing(_: &str) -> EntryKind {
        EntryKind::Missing
    }

    #[test]
    fn test_decode_strips_one_prefix() {
        assert_eq!(decode("filename"), "filename");
        assert_eq!(decode("__filename"), "filename");
        assert_eq!(decode("____filename"), "__filename");
        assert_eq!(decode(""), "");
    }

    #[test]
    fn test_prefixed_visible_name_is_double_quoted() {
        assert_eq!(to_disk("__image.png", nothing), "____image.png");
        assert_eq!(decode("____image.png"), "__image.png");
    }

    #[test]
    fn test_existing_plain_file_passes_through() {
        let probe = |name: &str| {
            if name == "image.png" {
                EntryKind::Attached
            } else {
                EntryKind::Missing
            }
        };
        assert_eq!(to_disk("image.png", probe), "image.png");
        assert_eq!(decode("image.png"), "image.png");
    }

    #[test]
    fn test_node_dir_collision_is_quoted() {
        let probe = |name: &str| {
            if name == "Projects" {
                EntryKind::NodeDir
            } else {
                EntryKind::Missing
            }
        };
        assert_eq!(to_disk("Projects", probe), "__Projects");
    }

    #[test]
    fn test_existing_quoted_file_is_found() {
        let probe = |name: &str| {
            if name == "__notes.txt" {
                EntryKind::Attached
            } else {
                EntryKind::Missing
            }
        };
        assert_eq!(to_disk("notes.txt", probe), "__notes.txt");
    }

    #[test]
    fn test_reserved_names_are_quoted() {
        assert_eq!(to_disk("node.json", nothing), "__node.json");
        assert_eq!(decode("__node.json"), "node.json");
        assert!(!is_valid_node_dirname("node.json"));
        assert!(!is_valid_node_dirname("__hidden"));
        assert!(is_valid_node_dirname("Projects"));
    }

    #[test]
    fn test_empty_name() {
        assert_eq!(to_disk("", nothing), "");
        assert_eq!(encode(""), "");
    }

    #[test]
    fn test_path_basename() {
        assert_eq!(path_basename("aaa/bbb"), "bbb");
        assert_eq!(path_basename("aaa/bbb/"), "bbb");
        assert_eq!(path_basename("aaa/"), "aaa");
        assert_eq!(path_basename("aaa"), "aaa");
        assert_eq!(path_basename(""), "");
        assert_eq!(path_basename("/"), "");
    }

    #[test]
    fn test_path_join_and_split() {
        assert_eq!(path_join(&["", "", "a", "b"]), "a/b");
        assert_eq!(path_join(&[""]), "");
        assert_eq!(split_first("img/a.png"), ("img", Some("a.png")));
        assert_eq!(split_first("img/"), ("img", None));
        assert_eq!(split_first("a.png"), ("a.png", None));
    }

    proptest! {
        #[test]
        fn prop_decode_inverts_encode(name in "(__)?[_a-zA-Z0-9 .é-]{0,16}") {
            let encoded = encode(&name);
            prop_assert_eq!(decode(&encoded), name.as_str());
        }

        #[test]
        fn prop_decode_inverts_quote(name in "\\PC{0,16}") {
            let quoted = quote(&name);
            prop_assert_eq!(decode(&quoted), name.as_str());
        }

        #[test]
        fn prop_to_disk_round_trips(name in "(__)?[_a-zA-Z0-9 .-]{0,16}", occupied in 0u8..3) {
            let probe = |candidate: &str| match occupied {
                1 if candidate == name => EntryKind::Attached,
                2 if candidate == name => EntryKind::NodeDir,
                _ => EntryKind::Missing,
            };
            let on_disk = to_disk(&name, probe);
            prop_assert_eq!(decode(&on_disk), name.as_str());
        }
    }
}
