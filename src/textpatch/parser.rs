//! Unified-diff parsing.
//!
//! Understands the git patch dialect produced by `format-patch`: mail
//! headers, `diff --git` file headers, mode lines, `index` lines, and
//! standard `@@` hunks. One patch file can touch any number of files.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};

/// A single line inside a hunk body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HunkLine {
    Context(String),
    Add(String),
    Remove(String),
}

/// One `@@` hunk: a contiguous region of change with its declared offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    /// 1-based start line in the old file.
    pub old_start: usize,
    pub old_count: usize,
    /// 1-based start line in the new file.
    pub new_start: usize,
    pub new_count: usize,
    pub lines: Vec<HunkLine>,
}

impl Hunk {
    /// The lines this hunk expects to find in the target (context + removed).
    pub fn old_lines(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter_map(|l| match l {
                HunkLine::Context(s) | HunkLine::Remove(s) => Some(s.as_str()),
                HunkLine::Add(_) => None,
            })
            .collect()
    }

    /// The lines this hunk produces (context + added).
    pub fn new_lines(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter_map(|l| match l {
                HunkLine::Context(s) | HunkLine::Add(s) => Some(s.as_str()),
                HunkLine::Remove(_) => None,
            })
            .collect()
    }

    /// Render the hunk back to unified-diff text, used for reject files.
    pub fn render(&self) -> String {
        let mut out = format!(
            "@@ -{},{} +{},{} @@\n",
            self.old_start, self.old_count, self.new_start, self.new_count
        );
        for line in &self.lines {
            match line {
                HunkLine::Context(s) => {
                    out.push(' ');
                    out.push_str(s);
                }
                HunkLine::Add(s) => {
                    out.push('+');
                    out.push_str(s);
                }
                HunkLine::Remove(s) => {
                    out.push('-');
                    out.push_str(s);
                }
            }
            out.push('\n');
        }
        out
    }
}

/// Changes to one file within a patch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileDiff {
    /// Path in the old tree; `None` for new files.
    pub old_path: Option<String>,
    /// Path in the new tree; `None` for deleted files.
    pub new_path: Option<String>,
    /// Mode recorded by an `old mode` / `deleted file mode` line.
    pub old_mode: Option<u32>,
    /// Mode recorded by a `new mode` / `new file mode` line.
    pub new_mode: Option<u32>,
    pub hunks: Vec<Hunk>,
    /// The new content does not end with a trailing newline.
    pub no_newline: bool,
}

impl FileDiff {
    /// The path this diff targets on disk.
    pub fn target_path(&self) -> Option<&str> {
        self.new_path.as_deref().or(self.old_path.as_deref())
    }

    pub fn is_new_file(&self) -> bool {
        self.old_path.is_none() && self.new_path.is_some()
    }

    pub fn is_delete(&self) -> bool {
        self.new_path.is_none() && self.old_path.is_some()
    }

    /// A change that only toggles file permissions.
    pub fn is_mode_only(&self) -> bool {
        self.hunks.is_empty()
            && self.new_mode.is_some()
            && self.old_mode.is_some()
            && !self.is_new_file()
            && !self.is_delete()
    }
}

fn hunk_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").expect("hunk header regex")
    })
}

/// Strip the `a/` / `b/` prefix git puts on header paths.
fn strip_prefix(path: &str) -> Option<String> {
    if path == "/dev/null" {
        return None;
    }
    let stripped = path
        .strip_prefix("a/")
        .or_else(|| path.strip_prefix("b/"))
        .unwrap_or(path);
    Some(stripped.to_string())
}

/// Parse one patch file into its per-file diffs.
///
/// Mail headers and the commit message produced by `format-patch` are
/// skipped; parsing starts at the first `diff --git` or `---` file header.
/// An empty patch parses to an empty list, not an error.
pub fn parse_patch(name: &str, text: &str) -> Result<Vec<FileDiff>> {
    let mut files: Vec<FileDiff> = Vec::new();
    let mut current: Option<FileDiff> = None;
    let mut in_body = false;

    let malformed = |message: String| Error::MalformedPatch {
        patch: name.to_string(),
        message,
    };

    let mut lines = text.lines().peekable();
    while let Some(line) = lines.next() {
        if let Some(rest) = line.strip_prefix("diff --git ") {
            if let Some(diff) = current.take() {
                files.push(diff);
            }
            // paths here are only a fallback; --- / +++ lines override them
            let mut diff = FileDiff::default();
            let parts: Vec<&str> = rest.split(' ').collect();
            if parts.len() == 2 {
                diff.old_path = strip_prefix(parts[0]);
                diff.new_path = strip_prefix(parts[1]);
            }
            current = Some(diff);
            in_body = true;
            continue;
        }

        let Some(diff) = current.as_mut() else {
            // Still in the mail header / commit message. A bare `--- ` line
            // also starts a plain (non-git) unified diff.
            if let Some(path) = line.strip_prefix("--- ") {
                if let Some(next) = lines.next_if(|next| next.starts_with("+++ ")) {
                    let mut diff = FileDiff::default();
                    diff.old_path = strip_prefix(path.trim_end());
                    diff.new_path = strip_prefix(next[4..].trim_end());
                    current = Some(diff);
                    in_body = true;
                }
            }
            continue;
        };

        if let Some(caps) = hunk_header_re().captures(line) {
            let parse_num = |idx: usize, default: usize| -> usize {
                caps.get(idx)
                    .map(|m| m.as_str().parse().unwrap_or(default))
                    .unwrap_or(default)
            };
            diff.hunks.push(Hunk {
                old_start: parse_num(1, 0),
                old_count: parse_num(2, 1),
                new_start: parse_num(3, 0),
                new_count: parse_num(4, 1),
                lines: Vec::new(),
            });
            continue;
        }

        if let Some(hunk) = diff.hunks.last_mut() {
            // Hunk body until the next header. format-patch appends a
            // signature-less trailer starting with `-- `, which would read
            // as a removal; the line counts bound the body instead.
            let consumed: usize = hunk
                .lines
                .iter()
                .map(|l| match l {
                    HunkLine::Context(_) => 2,
                    HunkLine::Add(_) | HunkLine::Remove(_) => 1,
                })
                .sum();
            let budget = hunk.old_count + hunk.new_count;
            if consumed < budget {
                match line.as_bytes().first() {
                    Some(b' ') => hunk.lines.push(HunkLine::Context(line[1..].to_string())),
                    Some(b'+') => hunk.lines.push(HunkLine::Add(line[1..].to_string())),
                    Some(b'-') => hunk.lines.push(HunkLine::Remove(line[1..].to_string())),
                    Some(b'\\') => diff.no_newline = true,
                    None => hunk.lines.push(HunkLine::Context(String::new())),
                    _ => {
                        return Err(malformed(format!("unexpected line in hunk body: {line}")));
                    }
                }
                continue;
            }
            if line.starts_with('\\') {
                diff.no_newline = true;
                continue;
            }
        }

        if !in_body {
            continue;
        }

        if let Some(mode) = line.strip_prefix("old mode ") {
            diff.old_mode = u32::from_str_radix(mode.trim(), 8).ok();
        } else if let Some(mode) = line.strip_prefix("new mode ") {
            diff.new_mode = u32::from_str_radix(mode.trim(), 8).ok();
        } else if let Some(mode) = line.strip_prefix("new file mode ") {
            diff.new_mode = u32::from_str_radix(mode.trim(), 8).ok();
            diff.old_path = None;
        } else if let Some(mode) = line.strip_prefix("deleted file mode ") {
            diff.old_mode = u32::from_str_radix(mode.trim(), 8).ok();
            diff.new_path = None;
        } else if let Some(path) = line.strip_prefix("--- ") {
            if diff.hunks.is_empty() {
                diff.old_path = strip_prefix(path.trim_end());
            } else if let Some(next) = lines.next_if(|next| next.starts_with("+++ ")) {
                // a ---/+++ pair after a completed body starts the next
                // file of a concatenated plain diff
                let mut next_diff = FileDiff::default();
                next_diff.old_path = strip_prefix(path.trim_end());
                next_diff.new_path = strip_prefix(next[4..].trim_end());
                files.push(std::mem::replace(diff, next_diff));
            }
        } else if let Some(path) = line.strip_prefix("+++ ") {
            if diff.hunks.is_empty() {
                diff.new_path = strip_prefix(path.trim_end());
            }
        }
        // index/similarity/rename lines carry no content we act on
    }

    if let Some(diff) = current.take() {
        files.push(diff);
    }

    for diff in &files {
        if diff.target_path().is_none() {
            return Err(malformed("file diff without any path header".to_string()));
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE: &str = "\
diff --git a/src/lib.rs b/src/lib.rs
index 1111111..2222222 100644
--- a/src/lib.rs
+++ b/src/lib.rs
@@ -1,3 +1,3 @@
 fn main() {
-    println!(\"hello\");
+    println!(\"hello, world\");
 }
";

    #[test]
    fn test_parse_simple_patch() {
        let files = parse_patch("simple.patch", SIMPLE).unwrap();
        assert_eq!(files.len(), 1);
        let diff = &files[0];
        assert_eq!(diff.target_path(), Some("src/lib.rs"));
        assert_eq!(diff.hunks.len(), 1);
        let hunk = &diff.hunks[0];
        assert_eq!(hunk.old_start, 1);
        assert_eq!(hunk.old_count, 3);
        assert_eq!(hunk.old_lines(), vec!["fn main() {", "    println!(\"hello\");", "}"]);
        assert_eq!(
            hunk.new_lines(),
            vec!["fn main() {", "    println!(\"hello, world\");", "}"]
        );
    }

    #[test]
    fn test_parse_skips_mail_header() {
        let patch = format!(
            "From 0000000000000000000000000000000000000000 Mon Sep 17 00:00:00 2001\n\
             From: Author <noreply@example.org>\n\
             Date: Sun, 20 Apr 1997 13:37:42 +0000\n\
             Subject: [PATCH] tweak greeting\n\
             \n\
             Commit message body.\n\
             ---\n\
             {}",
            SIMPLE
        );
        let files = parse_patch("mail.patch", &patch).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].hunks.len(), 1);
    }

    #[test]
    fn test_parse_new_file() {
        let patch = "\
diff --git a/docs/NEW.md b/docs/NEW.md
new file mode 100644
index 0000000..3333333
--- /dev/null
+++ b/docs/NEW.md
@@ -0,0 +1,2 @@
+# New
+content
";
        let files = parse_patch("new.patch", patch).unwrap();
        let diff = &files[0];
        assert!(diff.is_new_file());
        assert_eq!(diff.target_path(), Some("docs/NEW.md"));
        assert_eq!(diff.new_mode, Some(0o100644));
        assert_eq!(diff.hunks[0].new_lines(), vec!["# New", "content"]);
        assert!(diff.hunks[0].old_lines().is_empty());
    }

    #[test]
    fn test_parse_deleted_file() {
        let patch = "\
diff --git a/old.txt b/old.txt
deleted file mode 100644
index 4444444..0000000
--- a/old.txt
+++ /dev/null
@@ -1,1 +0,0 @@
-gone
";
        let files = parse_patch("del.patch", patch).unwrap();
        let diff = &files[0];
        assert!(diff.is_delete());
        assert_eq!(diff.target_path(), Some("old.txt"));
    }

    #[test]
    fn test_parse_mode_only_patch() {
        let patch = "\
diff --git a/run.sh b/run.sh
old mode 100644
new mode 100755
";
        let files = parse_patch("mode.patch", patch).unwrap();
        let diff = &files[0];
        assert!(diff.is_mode_only());
        assert_eq!(diff.old_mode, Some(0o100644));
        assert_eq!(diff.new_mode, Some(0o100755));
    }

    #[test]
    fn test_parse_multiple_files() {
        let patch = format!(
            "{}diff --git a/b.txt b/b.txt\nindex 5..6 100644\n--- a/b.txt\n+++ b/b.txt\n@@ -1,1 +1,1 @@\n-x\n+y\n",
            SIMPLE
        );
        let files = parse_patch("multi.patch", &patch).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[1].target_path(), Some("b.txt"));
    }

    #[test]
    fn test_parse_concatenated_plain_diff() {
        // two files with no `diff --git` separator between them
        let patch = "\
--- a/first.txt
+++ b/first.txt
@@ -1,1 +1,1 @@
-alpha
+ALPHA
--- a/second.txt
+++ b/second.txt
@@ -1,1 +1,1 @@
-beta
+BETA
";
        let files = parse_patch("plain.patch", patch).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].target_path(), Some("first.txt"));
        assert_eq!(files[0].hunks.len(), 1);
        assert_eq!(files[1].target_path(), Some("second.txt"));
        assert_eq!(files[1].hunks[0].new_lines(), vec!["BETA"]);
    }

    #[test]
    fn test_parse_no_newline_marker() {
        let patch = "\
diff --git a/x b/x
--- a/x
+++ b/x
@@ -1,1 +1,1 @@
-a
+b
\\ No newline at end of file
";
        let files = parse_patch("nonl.patch", patch).unwrap();
        assert!(files[0].no_newline);
    }

    #[test]
    fn test_parse_empty_patch() {
        let files = parse_patch("empty.patch", "").unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_parse_garbage_in_hunk_is_error() {
        let patch = "\
diff --git a/x b/x
--- a/x
+++ b/x
@@ -1,2 +1,2 @@
 ctx
garbage line
";
        let err = parse_patch("bad.patch", patch).unwrap_err();
        assert!(matches!(err, Error::MalformedPatch { .. }));
    }

    #[test]
    fn test_render_round_trips_hunk_shape() {
        let files = parse_patch("simple.patch", SIMPLE).unwrap();
        let rendered = files[0].hunks[0].render();
        assert!(rendered.starts_with("@@ -1,3 +1,3 @@"));
        assert!(rendered.contains("-    println!(\"hello\");"));
        assert!(rendered.contains("+    println!(\"hello, world\");"));
    }
}
