//! Minimal `sh -c` interpreter for the in-memory runtime.
//!
//! Supports the command subset the test suites exercise: `;` and `&&`
//! chaining, single/double quoting, `$VAR`/`${VAR}` expansion, output
//! redirection with `>` and `>>`, and the usual coreutils suspects
//! (`echo`, `touch`, `test`, `cat`, `rm`, `mkdir`, `true`, `false`, `pwd`,
//! `env`, `exit`, `sleep`, `command -v`). Unknown commands exit 127.

use std::collections::BTreeMap;

/// Filesystem and process context a script runs against.
pub struct ShellContext<'a> {
    /// Absolute path → file contents
    pub files: &'a mut BTreeMap<String, Vec<u8>>,
    /// Explicitly created directories
    pub dirs: &'a mut std::collections::BTreeSet<String>,
    /// Environment variables visible to the script
    pub env: &'a BTreeMap<String, String>,
    /// Working directory relative paths resolve against
    pub workdir: String,
    /// Whether `command -v bash` succeeds
    pub has_bash: bool,
}

/// Result of running a script.
pub struct ScriptResult {
    /// Exit code of the script
    pub exit_code: i32,
    /// Accumulated standard output
    pub stdout: String,
    /// Accumulated standard error
    pub stderr: String,
}

/// Run a script, mutating the context in place.
pub fn run_script(ctx: &mut ShellContext<'_>, script: &str) -> ScriptResult {
    let mut stdout = String::new();
    let mut stderr = String::new();
    let mut last_exit = 0;

    for (connector, segment) in split_commands(script) {
        if connector == Connector::And && last_exit != 0 {
            continue;
        }
        let tokens = tokenize(segment.trim(), ctx.env);
        if tokens.is_empty() {
            continue;
        }
        match run_command(ctx, &tokens, &mut stdout, &mut stderr) {
            CommandResult::Exit(code) => {
                return ScriptResult {
                    exit_code: code,
                    stdout,
                    stderr,
                };
            }
            CommandResult::Done(code) => last_exit = code,
        }
    }

    ScriptResult {
        exit_code: last_exit,
        stdout,
        stderr,
    }
}

enum CommandResult {
    /// Command finished with the given code
    Done(i32),
    /// `exit` was called; terminate the whole script
    Exit(i32),
}

fn run_command(
    ctx: &mut ShellContext<'_>,
    tokens: &[String],
    stdout: &mut String,
    stderr: &mut String,
) -> CommandResult {
    // Peel off a trailing `> file` / `>> file` redirection.
    let (tokens, redirect) = match tokens.iter().position(|t| t == ">" || t == ">>") {
        Some(pos) if pos + 1 < tokens.len() => {
            let target = resolve(&ctx.workdir, &tokens[pos + 1]);
            let append = tokens[pos] == ">>";
            (&tokens[..pos], Some((target, append)))
        }
        _ => (tokens, None),
    };
    let Some(command) = tokens.first() else {
        return CommandResult::Done(0);
    };
    let args = &tokens[1..];

    let mut local_out = String::new();
    let code = match command.as_str() {
        "echo" => {
            let (newline, args) = if args.first().is_some_and(|a| a == "-n") {
                (false, &args[1..])
            } else {
                (true, args)
            };
            local_out.push_str(&args.join(" "));
            if newline {
                local_out.push('\n');
            }
            0
        }
        "true" => 0,
        "false" => 1,
        "exit" => {
            let code = args.first().and_then(|a| a.parse().ok()).unwrap_or(0);
            flush(ctx, redirect, &local_out, stdout);
            return CommandResult::Exit(code);
        }
        "pwd" => {
            local_out.push_str(&ctx.workdir);
            local_out.push('\n');
            0
        }
        "env" => {
            for (key, value) in ctx.env {
                local_out.push_str(&format!("{key}={value}\n"));
            }
            0
        }
        "touch" => {
            for arg in args {
                let path = resolve(&ctx.workdir, arg);
                ctx.files.entry(path).or_default();
            }
            0
        }
        "mkdir" => {
            for arg in args.iter().filter(|a| *a != "-p") {
                ctx.dirs.insert(resolve(&ctx.workdir, arg));
            }
            0
        }
        "test" => run_test(ctx, args),
        "cat" => {
            let mut code = 0;
            for arg in args {
                let path = resolve(&ctx.workdir, arg);
                match ctx.files.get(&path) {
                    Some(contents) => {
                        local_out.push_str(&String::from_utf8_lossy(contents));
                    }
                    None => {
                        stderr.push_str(&format!("cat: {arg}: No such file or directory\n"));
                        code = 1;
                    }
                }
            }
            code
        }
        "rm" => {
            let force = args.iter().any(|a| a == "-f" || a == "-rf" || a == "-fr");
            let recursive = args.iter().any(|a| a == "-r" || a == "-rf" || a == "-fr");
            let mut code = 0;
            for arg in args.iter().filter(|a| !a.starts_with('-')) {
                let path = resolve(&ctx.workdir, arg);
                let existed = if recursive {
                    let prefix = format!("{path}/");
                    let before = ctx.files.len();
                    ctx.files.retain(|p, _| p != &path && !p.starts_with(&prefix));
                    ctx.dirs.retain(|d| d != &path && !d.starts_with(&prefix));
                    before != ctx.files.len()
                } else {
                    ctx.files.remove(&path).is_some()
                };
                if !existed && !force {
                    stderr.push_str(&format!("rm: cannot remove '{arg}': No such file or directory\n"));
                    code = 1;
                }
            }
            code
        }
        "sleep" => 0,
        "command" => {
            // `command -v NAME`
            if args.first().is_some_and(|a| a == "-v") {
                match args.get(1).map(String::as_str) {
                    Some("bash") if ctx.has_bash => {
                        local_out.push_str("/bin/bash\n");
                        0
                    }
                    Some("sh") => {
                        local_out.push_str("/bin/sh\n");
                        0
                    }
                    _ => 1,
                }
            } else {
                1
            }
        }
        other => {
            stderr.push_str(&format!("sh: {other}: not found\n"));
            127
        }
    };

    flush(ctx, redirect, &local_out, stdout);
    CommandResult::Done(code)
}

fn flush(
    ctx: &mut ShellContext<'_>,
    redirect: Option<(String, bool)>,
    local_out: &str,
    stdout: &mut String,
) {
    match redirect {
        Some((target, append)) => {
            let entry = ctx.files.entry(target).or_default();
            if !append {
                entry.clear();
            }
            entry.extend_from_slice(local_out.as_bytes());
        }
        None => stdout.push_str(local_out),
    }
}

fn run_test(ctx: &ShellContext<'_>, args: &[String]) -> i32 {
    match args {
        [flag, path] if flag == "-e" || flag == "-f" => {
            let resolved = resolve(&ctx.workdir, path);
            if ctx.files.contains_key(&resolved) {
                0
            } else {
                1
            }
        }
        [flag, path] if flag == "-d" => {
            let resolved = resolve(&ctx.workdir, path);
            let prefix = format!("{resolved}/");
            if ctx.dirs.contains(&resolved) || ctx.files.keys().any(|p| p.starts_with(&prefix)) {
                0
            } else {
                1
            }
        }
        [value] => i32::from(value.is_empty()),
        _ => 1,
    }
}

fn resolve(workdir: &str, path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("{}/{}", workdir.trim_end_matches('/'), path)
    }
}

#[derive(PartialEq, Clone, Copy)]
enum Connector {
    Seq,
    And,
}

/// Split a script on `;`, `&&`, and newlines, outside quotes.
fn split_commands(script: &str) -> Vec<(Connector, String)> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut connector = Connector::Seq;
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
            ';' | '\n' if !in_single && !in_double => {
                segments.push((connector, std::mem::take(&mut current)));
                connector = Connector::Seq;
            }
            '&' if !in_single && !in_double && chars.peek() == Some(&'&') => {
                chars.next();
                segments.push((connector, std::mem::take(&mut current)));
                connector = Connector::And;
            }
            _ => current.push(c),
        }
    }
    segments.push((connector, current));
    segments.into_iter().filter(|(_, s)| !s.trim().is_empty()).collect()
}

/// Split a command into tokens, handling quotes and `$VAR` expansion.
fn tokenize(input: &str, env: &BTreeMap<String, String>) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut started = false;
    let mut chars = input.chars().peekable();
    let mut in_single = false;
    let mut in_double = false;

    while let Some(c) = chars.next() {
        match c {
            '\'' if !in_double => {
                in_single = !in_single;
                started = true;
            }
            '"' if !in_single => {
                in_double = !in_double;
                started = true;
            }
            '$' if !in_single => {
                current.push_str(&expand_var(&mut chars, env));
                started = true;
            }
            c if c.is_whitespace() && !in_single && !in_double => {
                if started {
                    tokens.push(std::mem::take(&mut current));
                    started = false;
                }
            }
            _ => {
                current.push(c);
                started = true;
            }
        }
    }
    if started {
        tokens.push(current);
    }
    tokens
}

fn expand_var(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    env: &BTreeMap<String, String>,
) -> String {
    let mut name = String::new();
    if chars.peek() == Some(&'{') {
        chars.next();
        while let Some(&c) = chars.peek() {
            chars.next();
            if c == '}' {
                break;
            }
            name.push(c);
        }
    } else {
        while let Some(&c) = chars.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                name.push(c);
                chars.next();
            } else {
                break;
            }
        }
    }
    if name.is_empty() {
        return "$".to_string();
    }
    env.get(&name).cloned().unwrap_or_default()
}
