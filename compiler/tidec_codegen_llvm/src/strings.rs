//! String-Literal Pool (spec §4.C): every distinct Go string literal a
//! package's function bodies reference is interned exactly once, as a
//! private, constant, byte-array global named `str_%04d` in declaration
//! order -- a `string` value at a use site is then `{getelementptr(global,
//! 0, 0), len}`.
//!
//! Grounded on `original_source/irgen/string.go`, which keeps a
//! `map[string]*ir.Global` cache and a monotonic counter for the same
//! naming scheme. This backend is single-threaded per package (spec §5), so
//! the cache needs no synchronization beyond the `RefCell` every other piece
//! of mutable `CodegenCtx` state already uses.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use inkwell::context::Context;
use inkwell::module::{Linkage, Module};
use inkwell::values::GlobalValue;
use inkwell::AddressSpace;

pub struct StringPool<'ll> {
    ll_context: &'ll Context,
    entries: RefCell<HashMap<String, GlobalValue<'ll>>>,
    next_index: Cell<u32>,
}

impl<'ll> StringPool<'ll> {
    pub fn new(ll_context: &'ll Context) -> Self {
        StringPool {
            ll_context,
            entries: RefCell::new(HashMap::new()),
            next_index: Cell::new(0),
        }
    }

    /// Returns the global backing `value`, interning it under a fresh
    /// `str_%04d` name the first time it is seen (spec §4.C).
    pub fn intern(&self, ll_module: &Module<'ll>, value: &str) -> GlobalValue<'ll> {
        if let Some(global) = self.entries.borrow().get(value) {
            return *global;
        }

        let index = self.next_index.get();
        self.next_index.set(index + 1);
        let name = format!("str_{index:04}");

        let const_bytes = self.ll_context.const_string(value.as_bytes(), false);
        let global = ll_module.add_global(const_bytes.get_type(), Some(AddressSpace::default()), &name);
        global.set_initializer(&const_bytes);
        global.set_constant(true);
        global.set_linkage(Linkage::Private);

        self.entries.borrow_mut().insert(value.to_string(), global);
        global
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_the_same_literal_twice_reuses_the_global() {
        let ll_context = Context::create();
        let ll_module = ll_context.create_module("test");
        let pool = StringPool::new(&ll_context);

        let a = pool.intern(&ll_module, "hello");
        let b = pool.intern(&ll_module, "hello");
        assert_eq!(a.get_name(), b.get_name());
    }

    #[test]
    fn distinct_literals_get_distinct_names_in_declaration_order() {
        let ll_context = Context::create();
        let ll_module = ll_context.create_module("test");
        let pool = StringPool::new(&ll_context);

        let first = pool.intern(&ll_module, "foo");
        let second = pool.intern(&ll_module, "bar");
        assert_eq!(first.get_name().to_str().unwrap(), "str_0000");
        assert_eq!(second.get_name().to_str().unwrap(), "str_0001");
    }
}
