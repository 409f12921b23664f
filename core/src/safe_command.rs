//! The "safe command" classifier, used by the `unless-trusted` approval
//! policy to recognise read-only shell commands.
//!
//! A tree-sitter-bash single-word-command parser underlies `bash -lc`
//! unwrapping, paired with pipe/`&&`/`||`/`;` splitting, redirection
//! detection, and whitelists for `git`/`cargo`/`npm`/`yarn`/`pnpm`/`find`/
//! `sed`/`python`/`node`. False negatives (declaring a safe command unsafe)
//! are acceptable; false positives are not.

use tree_sitter::Parser;
use tree_sitter::Tree;
use tree_sitter_bash::LANGUAGE as BASH;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Safety {
    Safe,
    Unsafe,
}

impl Safety {
    pub fn is_safe(self) -> bool {
        matches!(self, Safety::Safe)
    }
}

const READ_ONLY_UTILITIES: &[&str] = &[
    "cat", "cd", "echo", "date", "env", "grep", "head", "ls", "pwd", "rg", "sort", "tail", "wc",
    "which", "basename", "dirname", "realpath", "file", "stat", "md5sum", "sha1sum", "sha256sum",
    "uname", "printf", "true", "false",
];

const GIT_READ_ONLY_SUBCOMMANDS: &[&str] = &[
    "status",
    "log",
    "diff",
    "show",
    "branch",
    "tag",
    "remote",
    "config",
    "ls-files",
    "ls-tree",
    "rev-parse",
    "describe",
    "shortlog",
    "blame",
    "reflog",
    "stash",
];

const PACKAGE_MANAGER_SAFE_SUBCOMMANDS: &[&str] = &[
    "check", "clippy", "fmt", "tree", "--version", "list", "view", "info", "outdated", "audit",
];

const UNSAFE_FIND_OPTIONS: &[&str] = &[
    "-exec", "-execdir", "-ok", "-okdir", "-delete", "-fls", "-fprint", "-fprint0", "-fprintf",
];

/// Entry point: `isSafeCommand`. Pure; whitespace-only differences between
/// inputs never change the result (the tokeniser already ignores them).
pub fn is_safe_command(command: &[String]) -> Safety {
    if command.is_empty() {
        return Safety::Unsafe;
    }

    // Strip a leading `bash -c` / `sh -c` wrapper and recurse on the inner
    // command, parsed as a single bash script.
    if let [shell, flag, script] = command {
        if (shell == "bash" || shell == "sh") && (flag == "-c" || flag == "-lc") {
            return classify_script(script);
        }
    }

    classify_segment(command)
}

fn classify_script(script: &str) -> Safety {
    let Some(tree) = try_parse_bash(script) else {
        return Safety::Unsafe;
    };
    if tree.root_node().has_error() {
        return Safety::Unsafe;
    }
    classify_raw_script(script)
}

/// Splits `script` on top-level `|`, `&&`, `&`, `||`, `;` (a heuristic
/// textual split, not a full shell grammar) and requires every segment to
/// parse as a single plain command and be safe. Any `>`/`>>` redirection
/// anywhere makes the whole script unsafe.
fn classify_raw_script(script: &str) -> Safety {
    if contains_redirection(script) {
        return Safety::Unsafe;
    }

    for segment in split_top_level(script) {
        let trimmed = segment.trim();
        if trimmed.is_empty() {
            continue;
        }
        let words = match parse_single_word_only_segment(trimmed) {
            Some(w) if !w.is_empty() => w,
            _ => return Safety::Unsafe,
        };
        if classify_segment(&words) != Safety::Safe {
            return Safety::Unsafe;
        }
    }
    Safety::Safe
}

/// Parses `segment` as its own standalone script and extracts its words only
/// if it is a single plain command: no command substitution, process
/// substitution, globbing, or control structures anywhere in it. Anything
/// else — `$(...)`, backticks, `<(...)`, `&` left dangling inside the
/// segment, etc. — fails the parse and the segment is treated as unsafe.
fn parse_single_word_only_segment(segment: &str) -> Option<Vec<String>> {
    let tree = try_parse_bash(segment)?;
    try_parse_single_word_only_command(&tree, segment)
}

/// Walks the command's AST node-by-node, accepting only plain words,
/// numbers, unescaped double-quoted strings, and single-quoted raw strings.
/// Any other node kind (command substitution, arithmetic expansion, glob
/// expansion, pipelines nested inside a single segment, …) rejects the
/// whole segment.
fn try_parse_single_word_only_command(tree: &Tree, src: &str) -> Option<Vec<String>> {
    if tree.root_node().has_error() {
        return None;
    }
    let root = tree.root_node();
    if root.kind() != "program" || root.named_child_count() != 1 {
        return None;
    }
    let cmd = root.named_child(0)?;
    if cmd.kind() != "command" {
        return None;
    }

    let mut words = Vec::new();
    let mut cursor = cmd.walk();
    for child in cmd.named_children(&mut cursor) {
        match child.kind() {
            "command_name" => {
                let word_node = child.named_child(0)?;
                if word_node.kind() != "word" {
                    return None;
                }
                words.push(word_node.utf8_text(src.as_bytes()).ok()?.to_owned());
            }
            "word" | "number" => {
                words.push(child.utf8_text(src.as_bytes()).ok()?.to_owned());
            }
            "string" => {
                if child.child_count() == 3
                    && child.child(0)?.kind() == "\""
                    && child.child(1)?.kind() == "string_content"
                    && child.child(2)?.kind() == "\""
                {
                    words.push(child.child(1)?.utf8_text(src.as_bytes()).ok()?.to_owned());
                } else {
                    return None;
                }
            }
            "concatenation" => return None,
            "raw_string" => {
                let raw_string = child.utf8_text(src.as_bytes()).ok()?;
                let stripped = raw_string.strip_prefix('\'').and_then(|s| s.strip_suffix('\''));
                match stripped {
                    Some(stripped) => words.push(stripped.to_owned()),
                    None => return None,
                }
            }
            _ => return None,
        }
    }
    Some(words)
}

fn contains_redirection(script: &str) -> bool {
    // A crude but conservative scan: any bare `>` not part of `>=`/`->` etc.
    // is treated as a redirection. False positives (declaring safe scripts
    // unsafe) are acceptable per spec.
    script.contains('>')
}

fn split_top_level(script: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = script.chars().peekable();
    let mut in_single = false;
    let mut in_double = false;

    while let Some(c) = chars.next() {
        match c {
            '\'' if !in_double => {
                in_single = !in_single;
                current.push(c);
            }
            '"' if !in_single => {
                in_double = !in_double;
                current.push(c);
            }
            '|' if !in_single && !in_double => {
                if chars.peek() == Some(&'|') {
                    chars.next();
                }
                segments.push(std::mem::take(&mut current));
            }
            '&' if !in_single && !in_double => {
                // Covers both `&&` and a bare `&` (job-control background
                // separator) — either way the segment before it ends here.
                if chars.peek() == Some(&'&') {
                    chars.next();
                }
                segments.push(std::mem::take(&mut current));
            }
            ';' if !in_single && !in_double => {
                segments.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    segments.push(current);
    segments
}

fn classify_segment(command: &[String]) -> Safety {
    let cmd0 = match command.first() {
        Some(c) => c.as_str(),
        None => return Safety::Unsafe,
    };

    let safe = match cmd0 {
        c if READ_ONLY_UTILITIES.contains(&c) => true,

        "find" => !command
            .iter()
            .any(|arg| UNSAFE_FIND_OPTIONS.contains(&arg.as_str())),

        "git" => matches!(
            command.get(1).map(String::as_str),
            Some(sub) if GIT_READ_ONLY_SUBCOMMANDS.contains(&sub)
        ),

        "cargo" | "npm" | "yarn" | "pnpm" => matches!(
            command.get(1).map(String::as_str),
            Some(sub) if PACKAGE_MANAGER_SAFE_SUBCOMMANDS.contains(&sub)
        ),

        "sed" => command.iter().any(|a| a == "-n"),

        "python" | "python3" | "node" => matches!(
            command.get(1).map(String::as_str),
            Some("--version" | "-V")
        ),

        "bash" | "sh" => {
            // Nested `bash -c`/`sh -c` wrapper, recurse.
            if let [_, flag, script] = command {
                return if flag == "-c" || flag == "-lc" {
                    classify_script(script)
                } else {
                    Safety::Unsafe
                };
            }
            false
        }

        _ => false,
    };

    if safe { Safety::Safe } else { Safety::Unsafe }
}

fn try_parse_bash(bash_lc_arg: &str) -> Option<Tree> {
    let lang = BASH.into();
    let mut parser = Parser::new();
    parser.set_language(&lang).ok()?;
    let old_tree: Option<&Tree> = None;
    parser.parse(bash_lc_arg, old_tree)
}
