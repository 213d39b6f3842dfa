//! Compiler option overrides written into the overlay tsconfig.

use serde_json::{Map, Value};

/// Options forced on every diagnostics-only run.
const CHECK_ONLY_OPTIONS: &[(&str, bool)] = &[
    ("noEmit", true),
    ("noEmitHelpers", true),
    ("importHelpers", false),
    ("declaration", false),
    ("declarationMap", false),
    ("emitDeclarationOnly", false),
    ("composite", false),
    ("sourceMap", false),
    ("inlineSourceMap", false),
];

/// `compilerOptions` layered on top of the project tsconfig.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompilerOverrides {
    options: Map<String, Value>,
}

impl CompilerOverrides {
    /// Overrides that disable every kind of output emission.
    pub fn check_only() -> Self {
        let options = CHECK_ONLY_OPTIONS
            .iter()
            .map(|(key, value)| (key.to_string(), Value::Bool(*value)))
            .collect();
        Self { options }
    }

    /// Merges user-supplied options on top. User keys win.
    pub fn merge(mut self, user: &Map<String, Value>) -> Self {
        for (key, value) in user {
            self.options.insert(key.clone(), value.clone());
        }
        self
    }

    /// Returns an option value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    /// Returns the options as a JSON object.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_check_only_disables_emit() {
        let overrides = CompilerOverrides::check_only();
        assert_eq!(overrides.get("noEmit"), Some(&Value::Bool(true)));
        assert_eq!(overrides.get("declaration"), Some(&Value::Bool(false)));
        assert_eq!(overrides.get("sourceMap"), Some(&Value::Bool(false)));
        assert!(overrides.get("strict").is_none());
    }

    #[test]
    fn test_user_options_win() {
        let user = json!({ "strict": true, "noEmit": false });
        let overrides = CompilerOverrides::check_only().merge(user.as_object().unwrap());

        assert_eq!(overrides.get("strict"), Some(&Value::Bool(true)));
        assert_eq!(overrides.get("noEmit"), Some(&Value::Bool(false)));
        assert_eq!(overrides.get("inlineSourceMap"), Some(&Value::Bool(false)));
    }
}
