//! The level-1/level-2 table walk itself (spec §4.4).

use thiserror::Error;

use crate::bus::AddressableNode;

use super::TranslationContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    SectionTranslation,
    PageTranslation,
    SectionDomain,
    PageDomain,
    SectionPermission,
    PagePermission,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("{kind:?} fault in domain {domain}")]
pub struct Fault {
    pub kind: FaultKind,
    pub domain: u8,
}

impl Fault {
    /// The 5-bit fault-status code used to compose DFSR/IFSR (spec §4.4).
    pub fn status_code(&self) -> u8 {
        match self.kind {
            FaultKind::SectionTranslation => 0x5,
            FaultKind::PageTranslation => 0x7,
            FaultKind::SectionDomain => 0x9,
            FaultKind::PageDomain => 0xB,
            FaultKind::SectionPermission => 0xD,
            FaultKind::PagePermission => 0xF,
        }
    }
}

/// Domain access classes from DACR (2 bits per domain).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DomainAccess {
    NoAccess,
    Client,
    Reserved,
    Manager,
}

fn domain_access(dacr: u32, domain: u8) -> DomainAccess {
    match (dacr >> (domain * 2)) & 0x3 {
        0 => DomainAccess::NoAccess,
        1 => DomainAccess::Client,
        2 => DomainAccess::Reserved,
        _ => DomainAccess::Manager,
    }
}

/// `AP[2:0]` reassembled from the APX bit and the AP[1:0] field.
fn check_ap(ap: u8, privileged: bool, write: bool) -> bool {
    match ap {
        0 => false,
        1 => privileged,
        2 => privileged || !write,
        3 => true,
        5 => privileged && !write,
        6 => !write,
        7 => !write,
        _ => false,
    }
}

struct SectionLike {
    base: u32,
    base_mask: u32,
    xn: bool,
    ns: bool,
    domain: u8,
    ap: u8,
}

/// Perform a single two-level translation-table walk.
///
/// `bus` is the *physical* bus, accessed via raw (untranslated) reads —
/// equivalent to the original's `raw_read` escape used by the table walker
/// itself (spec §4.1).
pub fn translate(
    ctx: &TranslationContext,
    bus: &mut dyn AddressableNode,
    v: u32,
    instruction: bool,
    write: bool,
) -> Result<u32, Fault> {
    if !ctx.sctlr_m {
        return Ok(v);
    }

    let n = ctx.ttbcr_n & 0x7;
    let tmp = v & (((1u32 << n) - 1).wrapping_shl(31 - n as u32));
    let ttbr_base = if tmp != 0 { ctx.ttbr1 } else { ctx.ttbr0 } & 0xFFFF_C000;

    let l1_index = v >> 20;
    let pde_addr = ttbr_base | (l1_index << 2);
    let pde = read_phys(bus, pde_addr)?;
    let pde_type = pde & 0x3;

    let entry = match pde_type {
        1 => {
            let domain = ((pde >> 5) & 0xF) as u8;
            let l2_base = pde & !0x3FF;
            let l2_index = (v >> 12) & 0xFF;
            let pte_addr = l2_base | (l2_index << 2);
            let pte = read_phys(bus, pte_addr)?;

            if pte & 0x2 != 0 {
                // Small page (4 KiB), per spec §4.4.
                let apx = (pte >> 9) & 0x1;
                let ap10 = (pte >> 4) & 0x3;
                SectionLike {
                    base: pte & !0x3FF,
                    base_mask: 0xFFF,
                    xn: pte & 0x1 != 0,
                    ns: pte & 0x8 != 0,
                    domain,
                    ap: ((apx << 2) | ap10) as u8,
                }
            } else if pte & 0x1 != 0 {
                // Large page (64 KiB).
                let apx = (pte >> 9) & 0x1;
                let ap10 = (pte >> 4) & 0x3;
                SectionLike {
                    base: pte & !0xFFFF,
                    base_mask: 0xFFFF,
                    xn: pte & 0x8000 != 0,
                    ns: pte & 0x8 != 0,
                    domain,
                    ap: ((apx << 2) | ap10) as u8,
                }
            } else {
                return Err(Fault {
                    kind: FaultKind::PageTranslation,
                    domain,
                });
            }
        }
        2 => {
            let domain = ((pde >> 5) & 0xF) as u8;
            let supersection = pde & 0x0004_0000 != 0;
            let apx = (pde >> 15) & 0x1;
            let ap10 = (pde >> 10) & 0x3;
            SectionLike {
                base: if supersection { pde & !0xFF_FFFF } else { pde & !0xF_FFFF },
                base_mask: if supersection { 0xFF_FFFF } else { 0xF_FFFF },
                xn: pde & 0x10 != 0,
                ns: pde & 0x8_0000 != 0,
                domain,
                ap: ((apx << 2) | ap10) as u8,
            }
        }
        _ => {
            let domain = ((pde >> 5) & 0xF) as u8;
            return Err(Fault {
                kind: FaultKind::SectionTranslation,
                domain,
            });
        }
    };

    let (domain_fault, permission_fault, translation_fault) = if pde_type == 1 {
        (FaultKind::PageDomain, FaultKind::PagePermission, FaultKind::PageTranslation)
    } else {
        (FaultKind::SectionDomain, FaultKind::SectionPermission, FaultKind::SectionTranslation)
    };

    if !ctx.secure && !entry.ns {
        return Err(Fault {
            kind: translation_fault,
            domain: entry.domain,
        });
    }

    if instruction && entry.xn {
        return Err(Fault {
            kind: permission_fault,
            domain: entry.domain,
        });
    }

    match domain_access(ctx.dacr, entry.domain) {
        DomainAccess::NoAccess | DomainAccess::Reserved => {
            return Err(Fault {
                kind: domain_fault,
                domain: entry.domain,
            });
        }
        DomainAccess::Client => {
            if !check_ap(entry.ap, ctx.privileged, write) {
                return Err(Fault {
                    kind: permission_fault,
                    domain: entry.domain,
                });
            }
        }
        DomainAccess::Manager => {}
    }

    Ok(entry.base | (v & entry.base_mask))
}

fn read_phys(bus: &mut dyn AddressableNode, addr: u32) -> Result<u32, Fault> {
    bus.read_default(addr).map_err(|_| Fault {
        kind: FaultKind::SectionTranslation,
        domain: 0,
    })
}
