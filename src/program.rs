//! Kernel source loading and the program build step.
//!
//! The host device does not compile OpenCL C. A build checks the options,
//! scans the source for kernel entry points and bracket balance, and binds
//! each entry point to a registered host implementation. Anything that
//! would stop a real compiler ends up in the build log.

use crate::error::{BuildFailure, BuildLog, Error, Result};
use crate::kernel::{HostKernel, Kernel};
use crate::kernels;
use crate::platform::DeviceInfo;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

const CL_STANDARDS: &[&str] = &["CL1.1", "CL1.2", "CL2.0", "CL3.0"];

const FLAG_OPTIONS: &[&str] = &[
    "-cl-mad-enable",
    "-cl-fast-relaxed-math",
    "-cl-finite-math-only",
    "-cl-no-signed-zeros",
    "-cl-unsafe-math-optimizations",
    "-cl-denorms-are-zero",
    "-cl-opt-disable",
    "-cl-kernel-arg-info",
    "-Werror",
    "-w",
];

/// Read a kernel source file. The text is passed to the build untouched.
pub fn load_source<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    std::fs::read_to_string(path).map_err(|e| Error::Io(format!("{}: {}", path.display(), e)))
}

/// Host implementations a program build can bind entry points to.
#[derive(Clone, Default)]
pub struct KernelRegistry {
    kernels: HashMap<String, Arc<dyn HostKernel>>,
}

impl KernelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for kernel in kernels::builtins() {
            registry.register(kernel);
        }
        registry
    }

    /// Register an implementation, replacing any previous one of that name.
    pub fn register(&mut self, kernel: Arc<dyn HostKernel>) -> &mut Self {
        self.kernels.insert(kernel.name().to_string(), kernel);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn HostKernel>> {
        self.kernels.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.kernels.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.kernels.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Punct(char),
}

struct Lexed {
    tokens: Vec<(Token, usize)>,
    unterminated_comment: Option<usize>,
}

/// Split source into identifiers and punctuation with their line numbers,
/// dropping comments, literals and preprocessor lines.
fn lex(source: &str) -> Lexed {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();
    let mut line = 1;
    let mut line_start = true;
    let mut unterminated_comment = None;

    while let Some(c) = chars.next() {
        match c {
            '\n' => {
                line += 1;
                line_start = true;
                continue;
            }
            c if c.is_whitespace() => continue,
            '#' if line_start => {
                // preprocessor directive, honouring line continuations
                let mut prev = '#';
                while let Some(&n) = chars.peek() {
                    if n == '\n' && prev != '\\' {
                        break;
                    }
                    if n == '\n' {
                        line += 1;
                    }
                    prev = n;
                    chars.next();
                }
            }
            '/' if chars.peek() == Some(&'/') => {
                while let Some(&n) = chars.peek() {
                    if n == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                let start = line;
                chars.next();
                let mut closed = false;
                let mut prev = ' ';
                for n in chars.by_ref() {
                    if n == '\n' {
                        line += 1;
                    }
                    if prev == '*' && n == '/' {
                        closed = true;
                        break;
                    }
                    prev = n;
                }
                if !closed {
                    unterminated_comment = Some(start);
                }
            }
            '"' | '\'' => {
                let mut escaped = false;
                for n in chars.by_ref() {
                    if n == '\n' {
                        line += 1;
                    }
                    if !escaped && n == c {
                        break;
                    }
                    escaped = !escaped && n == '\\';
                }
            }
            c if c.is_alphanumeric() || c == '_' => {
                let mut ident = String::from(c);
                while let Some(&n) = chars.peek() {
                    if n.is_alphanumeric() || n == '_' || (c.is_ascii_digit() && n == '.') {
                        ident.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push((Token::Ident(ident), line));
            }
            c => tokens.push((Token::Punct(c), line)),
        }
        line_start = false;
    }

    Lexed {
        tokens,
        unterminated_comment,
    }
}

fn check_brackets(tokens: &[(Token, usize)], log: &mut Vec<String>) {
    let mut stack: Vec<(char, usize)> = Vec::new();
    for (token, line) in tokens {
        let Token::Punct(c) = token else { continue };
        match c {
            '(' | '{' | '[' => stack.push((*c, *line)),
            ')' | '}' | ']' => {
                let open = match c {
                    ')' => '(',
                    '}' => '{',
                    _ => '[',
                };
                match stack.pop() {
                    Some((o, _)) if o == open => {}
                    Some((o, l)) => log.push(format!(
                        "<source>:{}: error: '{}' does not match '{}' opened on line {}",
                        line, c, o, l
                    )),
                    None => log.push(format!("<source>:{}: error: unmatched '{}'", line, c)),
                }
            }
            _ => {}
        }
    }
    for (c, line) in stack {
        log.push(format!("<source>:{}: error: '{}' is never closed", line, c));
    }
}

/// Names of `__kernel void name(...)` entry points with their lines.
fn entry_points(tokens: &[(Token, usize)]) -> Vec<(String, usize)> {
    let mut found = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let is_kernel = matches!(&tokens[i].0, Token::Ident(s) if s == "__kernel" || s == "kernel");
        if !is_kernel {
            i += 1;
            continue;
        }

        // skip qualifiers and attributes up to the return type
        let mut j = i + 1;
        while j < tokens.len() && tokens[j].0 != Token::Ident("void".into()) {
            j += 1;
        }
        if let (Some((Token::Ident(name), line)), Some((Token::Punct('('), _))) =
            (tokens.get(j + 1), tokens.get(j + 2))
        {
            found.push((name.clone(), *line));
        }
        i = j + 1;
    }
    found
}

fn check_options(options: &str, log: &mut Vec<String>) {
    let mut words = options.split_whitespace();
    while let Some(opt) = words.next() {
        if let Some(std) = opt.strip_prefix("-cl-std=") {
            if !CL_STANDARDS.contains(&std) {
                log.push(format!("error: unsupported OpenCL standard '{}'", std));
            }
        } else if opt == "-D" || opt == "-I" {
            if words.next().is_none() {
                log.push(format!("error: option '{}' expects an argument", opt));
            }
        } else if opt.starts_with("-D") || opt.starts_with("-I") || FLAG_OPTIONS.contains(&opt) {
            continue;
        } else {
            log.push(format!("error: invalid build option '{}'", opt));
        }
    }
}

/// A built program: the entry points of one source, bound for one device.
#[derive(Clone)]
pub struct Program {
    device: String,
    options: String,
    kernels: HashMap<String, Arc<dyn HostKernel>>,
    entry_points: Vec<String>,
    log: String,
}

impl Program {
    pub fn build(
        source: &str,
        options: &str,
        device: &DeviceInfo,
        registry: &KernelRegistry,
    ) -> Result<Self> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        check_options(options, &mut errors);

        let lexed = lex(source);
        if let Some(line) = lexed.unterminated_comment {
            errors.push(format!("<source>:{}: error: unterminated comment", line));
        }
        check_brackets(&lexed.tokens, &mut errors);

        let mut kernels = HashMap::new();
        let mut names: Vec<String> = Vec::new();
        for (name, line) in entry_points(&lexed.tokens) {
            if names.contains(&name) {
                errors.push(format!(
                    "<source>:{}: error: redefinition of kernel '{}'",
                    line, name
                ));
                continue;
            }
            match registry.get(&name) {
                Some(kernel) => {
                    kernels.insert(name.clone(), Arc::clone(kernel));
                }
                None => errors.push(format!(
                    "<source>:{}: error: no implementation of kernel '{}' for device '{}'",
                    line, name, device.name
                )),
            }
            names.push(name);
        }

        if names.is_empty() {
            warnings.push("<source>: warning: program defines no kernels".to_string());
        }
        if options.split_whitespace().any(|o| o == "-Werror") && !warnings.is_empty() {
            errors.append(&mut warnings);
        }

        if !errors.is_empty() {
            let mut log = String::new();
            for line in errors.iter().chain(&warnings) {
                let _ = writeln!(log, "{}", line);
            }
            warn!(device = %device.name, errors = errors.len(), "program build failed");
            return Err(Error::Build(BuildFailure {
                logs: vec![BuildLog {
                    device: device.name.clone(),
                    log,
                }],
            }));
        }

        debug!(device = %device.name, kernels = ?names, "program built");
        Ok(Self {
            device: device.name.clone(),
            options: options.to_string(),
            kernels,
            entry_points: names,
            log: warnings.join("\n"),
        })
    }

    /// Create a kernel object for one entry point.
    pub fn kernel(&self, name: &str) -> Result<Kernel> {
        self.kernels
            .get(name)
            .map(|body| Kernel::new(Arc::clone(body)))
            .ok_or_else(|| Error::KernelNotFound(name.to_string()))
    }

    pub fn kernel_names(&self) -> &[String] {
        &self.entry_points
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn options(&self) -> &str {
        &self.options
    }

    /// Warnings of a successful build, empty when there were none.
    pub fn build_log(&self) -> &str {
        &self.log
    }
}

impl std::fmt::Debug for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Program")
            .field("device", &self.device)
            .field("kernels", &self.entry_points)
            .finish()
    }
}
