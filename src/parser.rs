use std::{env, ffi::CString, os::unix::fs::PermissionsExt, path::Path};

/// A tokenized command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub argv: Vec<String>,
    pub background: bool,
}

enum Token {
    Word(String),
    Background,
}

fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut rest = input.trim_start_matches(is_blank);

    while !rest.is_empty() {
        // A quote opens a single argument that runs to the closing quote,
        // spaces included.
        let (word, after) = if let Some(quoted) = rest.strip_prefix('\'') {
            match quoted.find('\'') {
                Some(end) => (&quoted[..end], &quoted[end + 1..]),
                None => (quoted, ""),
            }
        } else {
            match rest.find(is_blank) {
                Some(end) => (&rest[..end], &rest[end..]),
                None => (rest, ""),
            }
        };

        match word {
            "&" => tokens.push(Token::Background),
            w => tokens.push(Token::Word(w.to_string())),
        }
        rest = after.trim_start_matches(is_blank);
    }
    tokens
}

fn is_blank(c: char) -> bool {
    c == ' ' || c == '\t' || c == '\n' || c == '\r'
}

/// Split a raw line into arguments and the trailing `&` marker.
///
/// Only a final `&` means background; one in the middle of the line is
/// passed through as an ordinary argument.
pub fn parse_line(line: &str) -> CommandLine {
    let mut tokens = tokenize(line);
    let background = matches!(tokens.last(), Some(Token::Background));
    if background {
        tokens.pop();
    }

    let argv = tokens
        .into_iter()
        .map(|t| match t {
            Token::Word(w) => w,
            Token::Background => "&".to_string(),
        })
        .collect();
    CommandLine { argv, background }
}

/// Locate a program: names containing `/` are used as given, anything
/// else is looked up in `PATH`.
pub fn resolve_path(program: &str) -> Option<CString> {
    if program.contains('/') {
        return CString::new(program).ok();
    }
    let path = env::var("PATH").ok()?;
    path.split(':')
        .filter(|dir| !dir.is_empty())
        .map(|dir| format!("{}/{}", dir, program))
        .find(|full| is_executable(Path::new(full)))
        .and_then(|full| CString::new(full).ok())
}

fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
