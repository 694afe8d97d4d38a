//! Data-driven table of the languages a session can switch between.

use collections::IndexMap;

use crate::control::SessionCommand;

/// Where a language's control bindings are installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindingScope {
    /// In the language's own top-level bindings.
    #[default]
    Language,
    /// In the shared polyglot bindings; the init snippet imports them.
    Polyglot,
}

/// Everything a session needs to know about one language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageSpec {
    pub id: String,
    pub display_name: String,
    /// Evaluated once, internally, when the session starts.
    pub init_snippet: String,
    /// Engine options as key/value pairs, applied when the runtime is built.
    pub options: Vec<(String, String)>,
    pub scope: BindingScope,
    /// Runtime function names mapped to the session command they trigger.
    pub bindings: IndexMap<String, SessionCommand>,
}

impl LanguageSpec {
    /// A language with the standard `clear`/`quit`/`exit` bindings.
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        let mut bindings = IndexMap::default();
        bindings.insert("clear".to_string(), SessionCommand::Clear);
        bindings.insert("quit".to_string(), SessionCommand::Exit);
        bindings.insert("exit".to_string(), SessionCommand::Exit);
        Self {
            id: id.into(),
            display_name: display_name.into(),
            init_snippet: String::new(),
            options: Vec::new(),
            scope: BindingScope::Language,
            bindings,
        }
    }

    pub fn with_init(mut self, snippet: impl Into<String>) -> Self {
        self.init_snippet = snippet.into();
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.push((key.into(), value.into()));
        self
    }

    pub fn with_scope(mut self, scope: BindingScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn binding(&self, name: &str) -> Option<SessionCommand> {
        self.bindings.get(name).copied()
    }
}

/// Ordered language table; order is the language-switch cycle order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LanguageTable {
    languages: IndexMap<String, LanguageSpec>,
}

impl LanguageTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The polyglot runtime's languages: `js`, `python`, `ruby`, `R`.
    pub fn polyglot() -> Self {
        let mut table = Self::new();
        table.insert(
            LanguageSpec::new("js", "JavaScript")
                .with_init("console.log(`GraalVM ${Graal.language} ${Graal.versionGraalVM}`)")
                .with_option("engine.WarnInterpreterOnly", "false"),
        );
        table.insert(
            LanguageSpec::new("python", "Python")
                .with_init("import sys,polyglot\nprint('GraalPython {}'.format(sys.version.split()[0]))"),
        );
        table.insert(
            LanguageSpec::new("ruby", "Ruby")
                .with_init(concat!(
                    "def quit() Polyglot.import('quit').call end;",
                    "def exit() Polyglot.import('exit').call end;",
                    "def clear() Polyglot.import('clear').call end; ",
                    "print(RUBY_ENGINE + ' (like ruby ' + RUBY_VERSION + ')\n');",
                ))
                .with_scope(BindingScope::Polyglot),
        );
        table.insert(LanguageSpec::new("R", "R"));
        table
    }

    /// Add or replace a language. A replaced language keeps its position.
    pub fn insert(&mut self, spec: LanguageSpec) {
        self.languages.insert(spec.id.clone(), spec);
    }

    pub fn get(&self, id: &str) -> Option<&LanguageSpec> {
        self.languages.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.languages.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.languages.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LanguageSpec> {
        self.languages.values()
    }

    pub fn len(&self) -> usize {
        self.languages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.languages.is_empty()
    }

    /// Keep only the languages for which `keep` returns true, preserving order.
    pub fn retain(&mut self, mut keep: impl FnMut(&LanguageSpec) -> bool) {
        self.languages.retain(|_, spec| keep(spec));
    }

    /// Reorder to follow `order`; ids not listed keep their relative order after it.
    pub fn reorder(&mut self, order: &[String]) {
        let rank = |id: &str| order.iter().position(|o| o == id).unwrap_or(order.len());
        self.languages.sort_by(|a, _, b, _| rank(a).cmp(&rank(b)));
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.languages.get_index_of(id)
    }

    pub fn get_index(&self, index: usize) -> Option<&LanguageSpec> {
        self.languages.get_index(index).map(|(_, spec)| spec)
    }

    /// The language after `index`, wrapping around.
    pub fn next_index(&self, index: usize) -> usize {
        if self.languages.is_empty() {
            0
        } else {
            (index + 1) % self.languages.len()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test]
    fn polyglot_table_order() {
        let table = LanguageTable::polyglot();
        assert_eq!(table.ids().collect::<Vec<_>>(), vec!["js", "python", "ruby", "R"]);
    }

    #[test_case("js", BindingScope::Language ; "js binds in its own scope")]
    #[test_case("python", BindingScope::Language ; "python binds in its own scope")]
    #[test_case("ruby", BindingScope::Polyglot ; "ruby imports from polyglot scope")]
    #[test_case("R", BindingScope::Language ; "r binds in its own scope")]
    fn binding_scopes(id: &str, scope: BindingScope) {
        assert_eq!(LanguageTable::polyglot().get(id).unwrap().scope, scope);
    }

    #[test]
    fn every_language_binds_clear_quit_exit() {
        for spec in LanguageTable::polyglot().iter() {
            assert_eq!(spec.binding("clear"), Some(SessionCommand::Clear));
            assert_eq!(spec.binding("quit"), Some(SessionCommand::Exit));
            assert_eq!(spec.binding("exit"), Some(SessionCommand::Exit));
            assert_eq!(spec.binding("print"), None);
        }
    }

    #[test]
    fn ruby_init_defines_bound_functions() {
        let table = LanguageTable::polyglot();
        let init = &table.get("ruby").unwrap().init_snippet;
        for name in ["quit", "exit", "clear"] {
            assert!(init.contains(&format!("Polyglot.import('{name}')")));
        }
        assert!(table.get("R").unwrap().init_snippet.is_empty());
    }

    #[test]
    fn retain_preserves_order() {
        let mut table = LanguageTable::polyglot();
        table.retain(|spec| spec.id != "python");
        assert_eq!(table.ids().collect::<Vec<_>>(), vec!["js", "ruby", "R"]);
    }

    #[test]
    fn reorder_follows_configured_order() {
        let mut table = LanguageTable::polyglot();
        table.reorder(&["R".to_string(), "python".to_string()]);
        assert_eq!(table.ids().collect::<Vec<_>>(), vec!["R", "python", "js", "ruby"]);
    }

    #[test]
    fn next_index_wraps() {
        let table = LanguageTable::polyglot();
        assert_eq!(table.next_index(0), 1);
        assert_eq!(table.next_index(3), 0);
        assert_eq!(LanguageTable::new().next_index(0), 0);
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut table = LanguageTable::polyglot();
        table.insert(LanguageSpec::new("python", "Python 3").with_init("pass"));
        assert_eq!(table.index_of("python"), Some(1));
        assert_eq!(table.get("python").unwrap().display_name, "Python 3");
    }
}
