/// Command prefixes the agent may run. Matched token-wise against the start of a command.
#[must_use]
pub fn default_allowed_commands() -> Vec<String> {
    vec![
        "npm install".into(),
        "npm list".into(),
        "npm test".into(),
        "npm run test".into(),
        "npm run build".into(),
        "npx @biomejs/biome".into(),
        "npx jest".into(),
        "npx vitest".into(),
        "ls".into(),
    ]
}

/// Path components the agent may never touch, whatever root they resolve under.
#[must_use]
pub fn default_restricted_paths() -> Vec<String> {
    vec![
        // Dependency caches and VCS internals
        "node_modules".into(),
        ".git".into(),
        // Environment secrets (.env, .env.local, ...)
        ".env".into(),
        // Our own audit database
        "patchwarden.db".into(),
    ]
}

/// Directory entries skipped by listings.
#[must_use]
pub fn default_ignored_entries() -> Vec<String> {
    vec![
        "node_modules".into(),
        ".git".into(),
        "dist".into(),
        "build".into(),
        ".DS_Store".into(),
    ]
}

/// Markers whose presence in a file suggests it is a complete module.
#[must_use]
pub fn default_structural_markers() -> Vec<String> {
    vec![
        "import ".into(),
        "export ".into(),
        "require(".into(),
        "module.exports".into(),
    ]
}
