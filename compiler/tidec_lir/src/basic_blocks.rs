use crate::syntax::{Statement, Terminator};
use tidec_utils::{idx::Idx, index_vec::IdxVec};

#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, PartialOrd, Ord)]
pub struct BasicBlock(usize);

/// The IR entry block reserved for `alloca` emission (spec §3, §4.E step 3).
///
/// By construction this is always the first block appended to a function
/// (the function lowerer appends it before indexing any SSA block), so its
/// index is always zero.
pub const ENTRY_BLOCK: BasicBlock = BasicBlock(0);

impl Idx for BasicBlock {
    fn new(idx: usize) -> Self {
        BasicBlock(idx)
    }

    fn idx(&self) -> usize {
        self.0
    }

    fn incr(&mut self) {
        self.0 += 1;
    }

    fn incr_by(&mut self, by: usize) {
        self.0 += by;
    }
}

#[derive(Debug, Clone)]
pub struct BasicBlockData {
    pub statements: Vec<Statement>,
    pub terminator: Terminator,
}

pub type BasicBlocks = IdxVec<BasicBlock, BasicBlockData>;
