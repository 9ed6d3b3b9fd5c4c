use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};

use parking_lot::{const_rwlock, RwLock};

/// A statically declared boolean tweakable.
///
/// Declarations are `static` so render code reads through the typed handle
/// rather than a string lookup. Writes happen on the main thread only;
/// relaxed atomics are sufficient.
pub struct CvarBool {
    name: &'static str,
    value: AtomicBool,
}

impl CvarBool {
    pub const fn new(name: &'static str, value: bool) -> Self {
        Self {
            name,
            value: AtomicBool::new(value),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get(&self) -> bool {
        self.value.load(Ordering::Relaxed)
    }

    pub fn set(&self, value: bool) {
        self.value.store(value, Ordering::Relaxed);
    }
}

/// A statically declared integer tweakable.
pub struct CvarInt {
    name: &'static str,
    value: AtomicI32,
}

impl CvarInt {
    pub const fn new(name: &'static str, value: i32) -> Self {
        Self {
            name,
            value: AtomicI32::new(value),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get(&self) -> i32 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn set(&self, value: i32) {
        self.value.store(value, Ordering::Relaxed);
    }
}

/// A statically declared float tweakable, stored as bits.
pub struct CvarFloat {
    name: &'static str,
    bits: AtomicU32,
}

impl CvarFloat {
    pub const fn new(name: &'static str, value: f32) -> Self {
        Self {
            name,
            bits: AtomicU32::new(value.to_bits()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    pub fn set(&self, value: f32) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }
}

enum CvarRef {
    Bool(&'static CvarBool),
    Int(&'static CvarInt),
    Float(&'static CvarFloat),
}

/// A delegate endpoint invoked by name with no arguments.
pub type ConsoleCommand = Box<dyn Fn() + Send + Sync>;

struct Registry {
    vars: HashMap<&'static str, CvarRef>,
    commands: HashMap<&'static str, ConsoleCommand>,
}

static REGISTRY: RwLock<Option<Registry>> = const_rwlock(None);

/// Process-wide name → tweakable registry.
///
/// Subsystems register their static declarations at startup; UI and console
/// input go through `set_from_str` / `invoke`, render code reads the typed
/// statics directly. Changes take effect the next frame.
pub struct ConsoleRegistry;

impl ConsoleRegistry {
    fn with_registry<R>(f: impl FnOnce(&mut Registry) -> R) -> R {
        let mut guard = REGISTRY.write();
        let registry = guard.get_or_insert_with(|| Registry {
            vars: HashMap::new(),
            commands: HashMap::new(),
        });
        f(registry)
    }

    pub fn register_bool(cvar: &'static CvarBool) {
        Self::with_registry(|r| r.vars.insert(cvar.name, CvarRef::Bool(cvar)));
    }

    pub fn register_int(cvar: &'static CvarInt) {
        Self::with_registry(|r| r.vars.insert(cvar.name, CvarRef::Int(cvar)));
    }

    pub fn register_float(cvar: &'static CvarFloat) {
        Self::with_registry(|r| r.vars.insert(cvar.name, CvarRef::Float(cvar)));
    }

    pub fn register_command(name: &'static str, command: ConsoleCommand) {
        Self::with_registry(|r| r.commands.insert(name, command));
    }

    /// Parse and apply a value by variable name. Returns false for unknown
    /// names or unparseable values.
    pub fn set_from_str(name: &str, value: &str) -> bool {
        Self::with_registry(|r| match r.vars.get(name) {
            Some(CvarRef::Bool(cvar)) => match value {
                "0" | "false" => {
                    cvar.set(false);
                    true
                }
                "1" | "true" => {
                    cvar.set(true);
                    true
                }
                _ => false,
            },
            Some(CvarRef::Int(cvar)) => value.parse().map(|v| cvar.set(v)).is_ok(),
            Some(CvarRef::Float(cvar)) => value.parse().map(|v| cvar.set(v)).is_ok(),
            None => {
                log::warn!("unknown console variable '{}'", name);
                false
            }
        })
    }

    /// Invoke a command delegate by name.
    pub fn invoke(name: &str) -> bool {
        let guard = REGISTRY.read();
        match guard.as_ref().and_then(|r| r.commands.get(name)) {
            Some(command) => {
                command();
                true
            }
            None => {
                log::warn!("unknown console command '{}'", name);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConsoleRegistry, CvarBool, CvarFloat, CvarInt};

    static TEST_BOOL: CvarBool = CvarBool::new("test.Bool", true);
    static TEST_INT: CvarInt = CvarInt::new("test.Int", 4);
    static TEST_FLOAT: CvarFloat = CvarFloat::new("test.Float", 1.5);

    #[test]
    fn typed_reads_and_string_writes() {
        ConsoleRegistry::register_bool(&TEST_BOOL);
        ConsoleRegistry::register_int(&TEST_INT);
        ConsoleRegistry::register_float(&TEST_FLOAT);

        assert!(TEST_BOOL.get());
        assert!(ConsoleRegistry::set_from_str("test.Bool", "0"));
        assert!(!TEST_BOOL.get());

        assert!(ConsoleRegistry::set_from_str("test.Int", "2"));
        assert_eq!(TEST_INT.get(), 2);

        assert!(ConsoleRegistry::set_from_str("test.Float", "0.25"));
        assert_eq!(TEST_FLOAT.get(), 0.25);

        assert!(!ConsoleRegistry::set_from_str("test.Int", "abc"));
        assert_eq!(TEST_INT.get(), 2);

        assert!(!ConsoleRegistry::set_from_str("test.Unknown", "1"));
    }
}
