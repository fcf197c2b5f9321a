use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Platform role.
///
/// Roles form a strict total order (see [`Role::rank`]). The order is only used
/// for relative comparisons; what a role may actually do is decided by the
/// permission matrices, never inherited implicitly from rank.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "SUPERADMIN")]
    SuperAdmin,
    #[serde(rename = "OPERADOR")]
    Operador,
    #[serde(rename = "CLIENTE_ADMIN")]
    ClienteAdmin,
    #[serde(rename = "CLIENTE_USER")]
    ClienteUser,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl Role {
    /// Every role, highest rank first.
    pub const ALL: [Role; 4] = [
        Role::SuperAdmin,
        Role::Operador,
        Role::ClienteAdmin,
        Role::ClienteUser,
    ];

    pub fn rank(self) -> u8 {
        match self {
            Role::SuperAdmin => 4,
            Role::Operador => 3,
            Role::ClienteAdmin => 2,
            Role::ClienteUser => 1,
        }
    }

    pub fn is_strictly_higher(self, other: Role) -> bool {
        self.rank() > other.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::SuperAdmin => "SUPERADMIN",
            Role::Operador => "OPERADOR",
            Role::ClienteAdmin => "CLIENTE_ADMIN",
            Role::ClienteUser => "CLIENTE_USER",
        }
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn ranks_are_distinct_and_cover_one_to_four() {
        let mut ranks: Vec<u8> = Role::ALL.iter().map(|r| r.rank()).collect();
        ranks.sort();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
    }

    #[test]
    fn names_round_trip_and_unknown_is_rejected() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert_eq!("ROOT".parse::<Role>(), Err(UnknownRole("ROOT".to_string())));
        // Names are case-sensitive.
        assert!("superadmin".parse::<Role>().is_err());
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&Role::ClienteAdmin).unwrap();
        assert_eq!(json, "\"CLIENTE_ADMIN\"");
        let back: Role = serde_json::from_str("\"SUPERADMIN\"").unwrap();
        assert_eq!(back, Role::SuperAdmin);
    }

    fn any_role() -> impl Strategy<Value = Role> {
        (0usize..4).prop_map(|i| Role::ALL[i])
    }

    proptest! {
        #[test]
        fn strictly_higher_is_irreflexive(a in any_role()) {
            prop_assert!(!a.is_strictly_higher(a));
        }

        #[test]
        fn strictly_higher_is_transitive(a in any_role(), b in any_role(), c in any_role()) {
            if a.is_strictly_higher(b) && b.is_strictly_higher(c) {
                prop_assert!(a.is_strictly_higher(c));
            }
        }

        #[test]
        fn order_is_total(a in any_role(), b in any_role()) {
            prop_assert!(a == b || a.is_strictly_higher(b) || b.is_strictly_higher(a));
        }
    }
}
