use crate::code_buffer::CodeBuffer;

/// A branch target within one compiled macro.
///
/// Labels support forward references: a jump may name a label before it is
/// bound, and binding back-patches every recorded use.
#[derive(Debug, Clone, Default)]
pub struct Label {
    /// Bound offset in the code buffer.
    value: Option<usize>,
    /// Forward references waiting for the label to be bound.
    uses: Vec<LabelUse>,
}

/// A reference to a label: where the displacement field was emitted.
#[derive(Debug, Clone, Copy)]
pub struct LabelUse {
    /// Offset of the 32-bit displacement field.
    pub offset: usize,
    pub kind: RelocKind,
}

/// Relocation types for label back-patching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocKind {
    /// RIP-relative 32-bit displacement; the instruction ends right after
    /// the field (jmp, jcc, lea [rip+disp32]).
    Rel32,
}

impl Label {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound offset, if the label has been placed.
    #[inline]
    pub fn value(&self) -> Option<usize> {
        self.value
    }

    #[inline]
    pub fn is_bound(&self) -> bool {
        self.value.is_some()
    }

    /// Whether there are unresolved forward references.
    pub fn has_pending_uses(&self) -> bool {
        !self.uses.is_empty() && self.value.is_none()
    }

    /// Emit a placeholder displacement for this label at the current
    /// position. Patched now if the label is bound, else on `bind`.
    pub fn emit_rel32(&mut self, buf: &mut CodeBuffer) {
        let offset = buf.offset();
        buf.emit_u32(0);
        if buf.is_exhausted() {
            return;
        }
        let use_ = LabelUse {
            offset,
            kind: RelocKind::Rel32,
        };
        match self.value {
            Some(target) => patch(buf, use_, target),
            None => self.uses.push(use_),
        }
    }

    /// Place the label at the current offset and resolve pending uses.
    pub fn bind(&mut self, buf: &mut CodeBuffer) {
        debug_assert!(self.value.is_none(), "label bound twice");
        let target = buf.offset();
        self.value = Some(target);
        for use_ in self.uses.drain(..) {
            patch(buf, use_, target);
        }
    }
}

fn patch(buf: &mut CodeBuffer, use_: LabelUse, target: usize) {
    match use_.kind {
        RelocKind::Rel32 => {
            let disp = target as i64 - (use_.offset as i64 + 4);
            buf.patch_u32(use_.offset, disp as i32 as u32);
        }
    }
}
