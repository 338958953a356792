//! The rule key hash stream.
//!
//! Every fold is a tagged [`FoldEvent`] encoded as a tag byte followed by
//! length-prefixed payloads, fed to a streaming XXH3-128 hasher. Composite
//! values are bracketed by scopes on an explicit stack. A scope writes an
//! opening marker just before the first event folded inside it and a tag
//! describing the structure when it closes, so two different field layouts
//! never flatten to the same byte stream. A scope nothing is folded into
//! writes nothing at all, except containers, which always record their shape.

use keystone_common::ContentHash;
use xxhash_rust::xxh3::Xxh3;

use crate::rule_key::RuleKey;

/// Collection shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    /// An ordered list.
    List,
    /// A map with sorted keys.
    Map,
}

/// Wrapper kinds around a single nested value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wrapper {
    /// An optional value.
    Optional,
    /// A nested appendable object.
    Appendable,
    /// A reference to another build rule.
    BuildRule,
    /// Archive dependencies.
    Archives,
}

/// A structural scope on the stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeTag {
    /// A named field.
    Key(String),
    /// A wrapper around one value.
    Wrapper(Wrapper),
    /// A collection.
    Container(Container),
    /// One element of the enclosing container.
    Element,
}

/// A single fold into the hash stream.
#[derive(Debug, Clone, Copy)]
pub enum FoldEvent<'a> {
    /// A field name, folded when its scope closes.
    Key(&'a str),
    /// An absent value.
    Null,
    /// A boolean.
    Bool(bool),
    /// An integer.
    Int(i64),
    /// A string.
    Str(&'a str),
    /// Raw bytes.
    Bytes(&'a [u8]),
    /// A repository file: its path and content hash.
    Path(&'a str, ContentHash),
    /// Another rule's output: the rule, its output path and content hash.
    TargetPath(&'a str, &'a str, ContentHash),
    /// An archive member: archive identity, member path and content hash.
    ArchiveMember(&'a str, &'a str, ContentHash),
    /// A path whose content is deliberately not hashed.
    NonHashingPath(&'a str),
    /// A build target name.
    BuildTarget(&'a str),
    /// The rule type name.
    RuleType(&'a str),
    /// A collection and the number of elements that contributed to it.
    Container(Container, usize),
    /// A wrapper kind.
    Wrapper(Wrapper),
}

impl FoldEvent<'_> {
    fn tag(&self) -> u8 {
        match self {
            FoldEvent::Key(_) => 1,
            FoldEvent::Null => 2,
            FoldEvent::Bool(_) => 3,
            FoldEvent::Int(_) => 4,
            FoldEvent::Str(_) => 5,
            FoldEvent::Bytes(_) => 6,
            FoldEvent::Path(..) => 7,
            FoldEvent::TargetPath(..) => 8,
            FoldEvent::ArchiveMember(..) => 9,
            FoldEvent::NonHashingPath(_) => 10,
            FoldEvent::BuildTarget(_) => 11,
            FoldEvent::RuleType(_) => 12,
            FoldEvent::Container(..) => 13,
            FoldEvent::Wrapper(_) => 14,
        }
    }
}

/// Tag byte of a scope's opening marker.
const OPEN_TAG: u8 = 15;

impl ScopeTag {
    fn code(&self) -> u8 {
        match self {
            ScopeTag::Key(_) => 1,
            ScopeTag::Wrapper(_) => 2,
            ScopeTag::Container(_) => 3,
            ScopeTag::Element => 4,
        }
    }
}

impl Container {
    fn code(self) -> u8 {
        match self {
            Container::List => 1,
            Container::Map => 2,
        }
    }
}

impl Wrapper {
    fn code(self) -> u8 {
        match self {
            Wrapper::Optional => 1,
            Wrapper::Appendable => 2,
            Wrapper::BuildRule => 3,
            Wrapper::Archives => 4,
        }
    }
}

struct OpenScope {
    tag: ScopeTag,
    /// Whether the opening marker has been written.
    opened: bool,
    /// Contributing elements, for containers.
    elements: usize,
}

/// Streaming hasher with a structural scope stack.
pub struct KeyHasher {
    state: Xxh3,
    events: u64,
    scopes: Vec<OpenScope>,
}

impl KeyHasher {
    /// Creates an empty hasher.
    pub fn new() -> Self {
        Self {
            state: Xxh3::new(),
            events: 0,
            scopes: Vec::new(),
        }
    }

    /// Number of events folded so far.
    pub fn events(&self) -> u64 {
        self.events
    }

    /// Current scope depth.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Folds one event.
    pub fn fold(&mut self, event: FoldEvent<'_>) {
        self.open_pending();
        self.state.update(&[event.tag()]);
        match event {
            FoldEvent::Null => {}
            FoldEvent::Bool(b) => self.state.update(&[b as u8]),
            FoldEvent::Int(i) => self.state.update(&i.to_le_bytes()),
            FoldEvent::Key(s)
            | FoldEvent::Str(s)
            | FoldEvent::NonHashingPath(s)
            | FoldEvent::BuildTarget(s)
            | FoldEvent::RuleType(s) => self.write(s.as_bytes()),
            FoldEvent::Bytes(b) => self.write(b),
            FoldEvent::Path(path, hash) => {
                self.write(path.as_bytes());
                self.state.update(hash.as_bytes());
            }
            FoldEvent::TargetPath(first, second, hash)
            | FoldEvent::ArchiveMember(first, second, hash) => {
                self.write(first.as_bytes());
                self.write(second.as_bytes());
                self.state.update(hash.as_bytes());
            }
            FoldEvent::Container(kind, count) => {
                self.state.update(&[kind.code()]);
                self.state.update(&(count as u64).to_le_bytes());
            }
            FoldEvent::Wrapper(kind) => self.state.update(&[kind.code()]),
        }
        self.events += 1;
    }

    /// Writes the opening markers of scopes nothing has been folded into
    /// yet, outermost first.
    fn open_pending(&mut self) {
        let Some(first) = self.scopes.iter().position(|s| !s.opened) else {
            return;
        };
        for scope in &mut self.scopes[first..] {
            self.state.update(&[OPEN_TAG, scope.tag.code()]);
            scope.opened = true;
        }
    }

    fn write(&mut self, bytes: &[u8]) {
        self.state.update(&(bytes.len() as u64).to_le_bytes());
        self.state.update(bytes);
    }

    /// Opens a scope.
    pub fn push_scope(&mut self, tag: ScopeTag) {
        self.scopes.push(OpenScope {
            tag,
            opened: false,
            elements: 0,
        });
    }

    /// Closes the innermost scope.
    ///
    /// Keys, wrappers and elements leave a trace only if something was
    /// folded inside them, so a value that contributes nothing leaves none.
    /// Containers always fold their shape with the number of contributing
    /// elements.
    pub fn pop_scope(&mut self) {
        if let Some(&OpenScope {
            tag: ScopeTag::Container(kind),
            elements,
            ..
        }) = self.scopes.last()
        {
            self.fold(FoldEvent::Container(kind, elements));
        }
        let Some(scope) = self.scopes.pop() else {
            debug_assert!(false, "pop_scope on an empty scope stack");
            return;
        };
        if !scope.opened {
            return;
        }
        match scope.tag {
            ScopeTag::Key(name) => self.fold(FoldEvent::Key(&name)),
            ScopeTag::Wrapper(kind) => self.fold(FoldEvent::Wrapper(kind)),
            ScopeTag::Container(_) => {}
            ScopeTag::Element => {
                if let Some(parent) = self.scopes.last_mut() {
                    parent.elements += 1;
                }
            }
        }
    }

    /// Finishes the stream.
    pub fn finish(self) -> RuleKey {
        debug_assert!(self.scopes.is_empty(), "unbalanced rule key scopes");
        RuleKey::from_raw(self.state.digest128().to_le_bytes())
    }
}

impl Default for KeyHasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_of(f: impl FnOnce(&mut KeyHasher)) -> RuleKey {
        let mut hasher = KeyHasher::new();
        f(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn empty_streams_agree() {
        assert_eq!(key_of(|_| {}), key_of(|_| {}));
    }

    #[test]
    fn length_prefix_separates_strings() {
        let ab_c = key_of(|h| {
            h.fold(FoldEvent::Str("ab"));
            h.fold(FoldEvent::Str("c"));
        });
        let a_bc = key_of(|h| {
            h.fold(FoldEvent::Str("a"));
            h.fold(FoldEvent::Str("bc"));
        });
        assert_ne!(ab_c, a_bc);
    }

    #[test]
    fn tags_separate_kinds() {
        let s = key_of(|h| h.fold(FoldEvent::Str("x")));
        let p = key_of(|h| h.fold(FoldEvent::NonHashingPath("x")));
        assert_ne!(s, p);
    }

    #[test]
    fn empty_key_scope_folds_nothing() {
        let scoped = key_of(|h| {
            h.push_scope(ScopeTag::Key("unused".to_string()));
            h.pop_scope();
        });
        assert_eq!(scoped, key_of(|_| {}));
    }

    #[test]
    fn key_scope_folds_name_after_content() {
        let mut hasher = KeyHasher::new();
        hasher.push_scope(ScopeTag::Key("a".to_string()));
        hasher.fold(FoldEvent::Int(1));
        hasher.pop_scope();
        assert_eq!(hasher.events(), 2);
        assert_eq!(hasher.depth(), 0);
    }

    #[test]
    fn structure_disambiguates_flattened_streams() {
        let flat = key_of(|h| {
            h.fold(FoldEvent::Int(1));
            h.fold(FoldEvent::Int(2));
        });
        let listed = key_of(|h| {
            h.push_scope(ScopeTag::Container(Container::List));
            for i in [1, 2] {
                h.push_scope(ScopeTag::Element);
                h.fold(FoldEvent::Int(i));
                h.pop_scope();
            }
            h.pop_scope();
        });
        let wrapped = key_of(|h| {
            h.push_scope(ScopeTag::Wrapper(Wrapper::Optional));
            h.fold(FoldEvent::Int(1));
            h.fold(FoldEvent::Int(2));
            h.pop_scope();
        });
        assert_ne!(flat, listed);
        assert_ne!(flat, wrapped);
        assert_ne!(listed, wrapped);
    }

    #[test]
    fn container_counts_contributing_elements() {
        let with_silent_element = key_of(|h| {
            h.push_scope(ScopeTag::Container(Container::List));
            h.push_scope(ScopeTag::Element);
            h.fold(FoldEvent::Int(1));
            h.pop_scope();
            h.push_scope(ScopeTag::Element);
            h.pop_scope();
            h.pop_scope();
        });
        let single = key_of(|h| {
            h.push_scope(ScopeTag::Container(Container::List));
            h.push_scope(ScopeTag::Element);
            h.fold(FoldEvent::Int(1));
            h.pop_scope();
            h.pop_scope();
        });
        assert_eq!(with_silent_element, single);
    }

    #[test]
    fn scope_boundaries_are_folded() {
        // [p=1, q=Appendable{r=2}] against [q=Appendable{p=1, r=2}]
        let field = |h: &mut KeyHasher, name: &str, value: i64| {
            h.push_scope(ScopeTag::Key(name.to_string()));
            h.fold(FoldEvent::Int(value));
            h.pop_scope();
        };
        let sibling = key_of(|h| {
            field(h, "p", 1);
            h.push_scope(ScopeTag::Key("q".to_string()));
            h.push_scope(ScopeTag::Wrapper(Wrapper::Appendable));
            field(h, "r", 2);
            h.pop_scope();
            h.pop_scope();
        });
        let nested = key_of(|h| {
            h.push_scope(ScopeTag::Key("q".to_string()));
            h.push_scope(ScopeTag::Wrapper(Wrapper::Appendable));
            field(h, "p", 1);
            field(h, "r", 2);
            h.pop_scope();
            h.pop_scope();
        });
        assert_ne!(sibling, nested);
    }

    #[test]
    fn element_boundaries_are_folded() {
        let map = |first: &[&str], second: &[&str]| {
            key_of(|h| {
                h.push_scope(ScopeTag::Container(Container::Map));
                for strs in [first, second] {
                    h.push_scope(ScopeTag::Element);
                    for s in strs {
                        h.fold(FoldEvent::Str(s));
                    }
                    h.pop_scope();
                }
                h.pop_scope();
            })
        };
        assert_ne!(map(&["a"], &["b", "x"]), map(&["a", "b"], &["x"]));
    }

    #[test]
    fn empty_container_opens_enclosing_scopes() {
        let mut hasher = KeyHasher::new();
        hasher.push_scope(ScopeTag::Key("deps".to_string()));
        hasher.push_scope(ScopeTag::Container(Container::List));
        hasher.pop_scope();
        hasher.pop_scope();
        assert_eq!(hasher.events(), 2);
    }

    #[test]
    fn content_hash_participates() {
        let a = key_of(|h| h.fold(FoldEvent::Path("a.h", ContentHash::from_bytes(b"1"))));
        let b = key_of(|h| h.fold(FoldEvent::Path("a.h", ContentHash::from_bytes(b"2"))));
        assert_ne!(a, b);
    }
}
