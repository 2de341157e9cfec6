//! Processor modes, exception kinds, and CPSR field layout.

/// The eight ARM processor modes (CPSR.M[4:0]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    User,
    Fiq,
    Irq,
    Svc,
    Monitor,
    Abort,
    Undefined,
    System,
}

impl Mode {
    pub fn from_bits(m: u32) -> Option<Mode> {
        match m & 0x1F {
            0x10 => Some(Mode::User),
            0x11 => Some(Mode::Fiq),
            0x12 => Some(Mode::Irq),
            0x13 => Some(Mode::Svc),
            0x16 => Some(Mode::Monitor),
            0x17 => Some(Mode::Abort),
            0x1B => Some(Mode::Undefined),
            0x1F => Some(Mode::System),
            _ => None,
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            Mode::User => 0x10,
            Mode::Fiq => 0x11,
            Mode::Irq => 0x12,
            Mode::Svc => 0x13,
            Mode::Monitor => 0x16,
            Mode::Abort => 0x17,
            Mode::Undefined => 0x1B,
            Mode::System => 0x1F,
        }
    }

    pub fn is_privileged(self) -> bool {
        !matches!(self, Mode::User)
    }

    /// Whether this mode has a private SPSR (spec §3).
    pub fn has_spsr(self) -> bool {
        matches!(
            self,
            Mode::Svc | Mode::Monitor | Mode::Abort | Mode::Undefined | Mode::Irq | Mode::Fiq
        )
    }
}

/// The seven ARM exception kinds, numbered as spec §4.5.4 numbers them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionKind {
    Undefined = 0,
    Smc = 1,
    Svc = 2,
    PrefetchAbort = 3,
    DataAbort = 4,
    Irq = 5,
    Fiq = 6,
}

impl ExceptionKind {
    /// The interrupt fabric's "returned_irq" convention for the two
    /// asynchronous kinds: the CPU registers itself on the controller's
    /// downstream IRQ/FIQ lines with `returned_irq` equal to the numeric
    /// exception kind, so `interrupt_triggered` can recover the kind
    /// directly from the delivered number.
    pub fn from_u32(v: u32) -> Option<ExceptionKind> {
        match v {
            0 => Some(ExceptionKind::Undefined),
            1 => Some(ExceptionKind::Smc),
            2 => Some(ExceptionKind::Svc),
            3 => Some(ExceptionKind::PrefetchAbort),
            4 => Some(ExceptionKind::DataAbort),
            5 => Some(ExceptionKind::Irq),
            6 => Some(ExceptionKind::Fiq),
            _ => None,
        }
    }

    pub const ALL: [ExceptionKind; 7] = [
        ExceptionKind::Undefined,
        ExceptionKind::Smc,
        ExceptionKind::Svc,
        ExceptionKind::PrefetchAbort,
        ExceptionKind::DataAbort,
        ExceptionKind::Irq,
        ExceptionKind::Fiq,
    ];

    /// `(arm_offset, thumb_offset)` added to the saved IP to form LR.
    pub fn link_offset(self) -> (u32, u32) {
        match self {
            ExceptionKind::Undefined => (4, 2),
            ExceptionKind::Smc => (4, 4),
            ExceptionKind::Svc => (4, 2),
            ExceptionKind::PrefetchAbort => (4, 4),
            ExceptionKind::DataAbort => (8, 8),
            ExceptionKind::Irq => (4, 4),
            ExceptionKind::Fiq => (4, 4),
        }
    }

    /// Offset from the vector base (spec §4.5.4).
    pub fn vector_offset(self) -> u32 {
        match self {
            ExceptionKind::Undefined => 0x04,
            ExceptionKind::Smc => 0x08,
            ExceptionKind::Svc => 0x08,
            ExceptionKind::PrefetchAbort => 0x0C,
            ExceptionKind::DataAbort => 0x10,
            ExceptionKind::Irq => 0x18,
            ExceptionKind::Fiq => 0x1C,
        }
    }

    /// The mode entered on taking this exception (ignoring Security
    /// Extensions rerouting, applied separately in `exceptions::route`).
    pub fn target_mode(self) -> Mode {
        match self {
            ExceptionKind::Undefined => Mode::Undefined,
            ExceptionKind::Smc => Mode::Monitor,
            ExceptionKind::Svc => Mode::Svc,
            ExceptionKind::PrefetchAbort => Mode::Abort,
            ExceptionKind::DataAbort => Mode::Abort,
            ExceptionKind::Irq => Mode::Irq,
            ExceptionKind::Fiq => Mode::Fiq,
        }
    }
}

/// CPSR bit positions (spec §3).
pub mod cpsr {
    pub const N: u32 = 31;
    pub const Z: u32 = 30;
    pub const C: u32 = 29;
    pub const V: u32 = 28;
    pub const Q: u32 = 27;
    pub const J: u32 = 24;
    pub const GE_SHIFT: u32 = 16;
    pub const GE_MASK: u32 = 0xF << GE_SHIFT;
    pub const E: u32 = 9;
    pub const A: u32 = 8;
    pub const I: u32 = 7;
    pub const F: u32 = 6;
    pub const T: u32 = 5;
    pub const MODE_MASK: u32 = 0x1F;
    pub const IT_LOW_SHIFT: u32 = 25;
    pub const IT_LOW_MASK: u32 = 0x3 << IT_LOW_SHIFT;
    pub const IT_HIGH_SHIFT: u32 = 10;
    pub const IT_HIGH_MASK: u32 = 0x3F << IT_HIGH_SHIFT;
}
