//! Built-in rule sets.
//!
//! Snippets are run non-interactively with no filesystem or network, so each
//! language bans stdin reads, file access, process spawning, dynamic module
//! loading, dynamic evaluation, and unseeded randomness.

/// Uncompiled rule definition.
#[derive(Debug, Clone, Copy)]
pub struct RuleSpec {
    /// Stable identifier.
    pub id: &'static str,
    /// Canonical language key.
    pub language: &'static str,
    /// Regex source.
    pub pattern: &'static str,
    /// Message shown to the learner.
    pub message: &'static str,
}

const fn rule(
    id: &'static str,
    language: &'static str,
    pattern: &'static str,
    message: &'static str,
) -> RuleSpec {
    RuleSpec {
        id,
        language,
        pattern,
        message,
    }
}

/// Alias keys and the canonical language they resolve to.
pub const ALIASES: &[(&str, &str)] = &[
    ("c++", "cpp"),
    ("cxx", "cpp"),
    ("js", "javascript"),
    ("node", "javascript"),
    ("py", "python"),
    ("python3", "python"),
];

/// Built-in rules, grouped by language in evaluation order.
pub const RULES: &[RuleSpec] = &[
    // C++
    rule(
        "cpp/cin",
        "cpp",
        r"\bcin\b",
        "Reading input with cin is not allowed. Snippets run without standard input.",
    ),
    rule(
        "cpp/c-stdin",
        "cpp",
        r"\b(?:scanf|gets|fgets|getchar|getline)\s*\(",
        "Reading from standard input (scanf, gets, getline) is not allowed.",
    ),
    rule(
        "cpp/fstream",
        "cpp",
        r"#\s*include\s*<\s*fstream\s*>|\b(?:ifstream|ofstream|fstream|fopen|freopen)\b",
        "File I/O is not allowed.",
    ),
    rule(
        "cpp/process",
        "cpp",
        r"\b(?:system|popen|fork|execl|execlp|execv|execvp|execve)\s*\(",
        "Starting other processes is not allowed.",
    ),
    rule(
        "cpp/random",
        "cpp",
        r"\b(?:rand|srand)\s*\(|\brandom_device\b",
        "Non-deterministic randomness is not allowed.",
    ),
    // JavaScript
    rule(
        "javascript/dynamic-import",
        "javascript",
        r"\bimport\s*\(",
        "Dynamic import() is not allowed.",
    ),
    rule(
        "javascript/static-import",
        "javascript",
        r"(?m)^\s*import\b",
        "Module import statements are not allowed.",
    ),
    rule(
        "javascript/require",
        "javascript",
        r"\brequire\s*\(",
        "Loading modules with require() is not allowed.",
    ),
    rule(
        "javascript/stdin",
        "javascript",
        r"\bprocess\.stdin\b|\breadline\b|\bprompt\s*\(",
        "Reading user input (process.stdin, readline, prompt) is not allowed.",
    ),
    rule(
        "javascript/eval",
        "javascript",
        r"\beval\s*\(|\bnew\s+Function\s*\(",
        "Dynamic code evaluation (eval, new Function) is not allowed.",
    ),
    rule(
        "javascript/script-tag",
        "javascript",
        r"(?i)<\s*/?\s*script\b",
        "Embedding <script> tags is not allowed.",
    ),
    rule(
        "javascript/random",
        "javascript",
        r"\bMath\.random\s*\(",
        "Non-deterministic randomness (Math.random) is not allowed.",
    ),
    // Python
    rule(
        "python/input",
        "python",
        r"\binput\s*\(",
        "Using input() is not allowed. Snippets run without standard input.",
    ),
    rule(
        "python/stdin",
        "python",
        r"\bsys\.stdin\b",
        "Reading from sys.stdin is not allowed.",
    ),
    rule(
        "python/open",
        "python",
        r"\bopen\s*\(",
        "File access with open() is not allowed.",
    ),
    rule(
        "python/dynamic-import",
        "python",
        r"\b__import__\s*\(|\bimportlib\b",
        "Dynamic imports are not allowed.",
    ),
    rule(
        "python/system-modules",
        "python",
        concat!(
            r"\bimport\s+(?:[\w.]+(?:\s+as\s+\w+)?\s*,\s*)*",
            r"(?:os|sys|subprocess|socket|shutil|ctypes|multiprocessing|pathlib)\b",
            r"|\bfrom\s+(?:os|sys|subprocess|socket|shutil|ctypes|multiprocessing|pathlib)\b",
        ),
        "Importing system modules (os, sys, subprocess, socket) is not allowed.",
    ),
    rule(
        "python/eval",
        "python",
        // Attribute calls such as `re.compile(` are ordinary library use.
        r"(?:^|[^.\w])(?:eval|exec|compile)\s*\(",
        "Dynamic code evaluation (eval, exec, compile) is not allowed.",
    ),
    rule(
        "python/random",
        "python",
        concat!(
            r"\bimport\s+(?:[\w.]+(?:\s+as\s+\w+)?\s*,\s*)*(?:random|secrets)\b",
            r"|\bfrom\s+(?:random|secrets)\b",
        ),
        "Non-deterministic randomness (random, secrets) is not allowed.",
    ),
    // Java
    rule(
        "java/stdin",
        "java",
        r"\bSystem\.in\b|\bSystem\.console\s*\(",
        "Reading from standard input (System.in) is not allowed.",
    ),
    rule(
        "java/file-io",
        "java",
        r"\bjava\.nio\.file\b|\bnew\s+File(?:Reader|Writer|InputStream|OutputStream)?\s*\(",
        "File I/O is not allowed.",
    ),
    rule(
        "java/process",
        "java",
        r"\bRuntime\.getRuntime\s*\(\s*\)\s*\.\s*exec\b|\bProcessBuilder\b",
        "Starting other processes is not allowed.",
    ),
    rule(
        "java/reflection",
        "java",
        r"\bClass\.forName\s*\(",
        "Reflective class loading is not allowed.",
    ),
    rule(
        "java/random",
        "java",
        r"\bMath\.random\s*\(|\bnew\s+(?:java\.util\.)?Random\s*\(",
        "Non-deterministic randomness is not allowed.",
    ),
];
