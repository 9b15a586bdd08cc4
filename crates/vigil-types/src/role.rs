//! Roles and organizational tiers.
//!
//! The organization is a fixed four-level tree:
//!
//! ```text
//! State (root, no key)
//!   └── District      (Tier::District)
//!         └── Mandal  (Tier::Mandal)
//!               └── Examination centre (Tier::Centre)
//! ```
//!
//! Each non-top role is confined to exactly one node of one tier:
//!
//! | Role | Confining tier |
//! |------|----------------|
//! | `SUPER_ADMIN` | none (unrestricted) |
//! | `DISTRICT_IN_CHARGE` | District |
//! | `MANDAL_IN_CHARGE` | Mandal |
//! | `CENTRE_IN_CHARGE` | Centre |
//!
//! Roles carry no permissions themselves. What a role may *do* is looked up
//! in the permission matrix (`vigil-auth`); callers never compare roles to
//! decide authorization.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A tier of the organizational tree below the state root.
///
/// Tiers are ordered by depth: `District` is the shallowest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// District tier.
    District,
    /// Mandal tier, children of districts.
    Mandal,
    /// Examination centre tier, children of mandals.
    Centre,
}

impl Tier {
    /// All tiers, shallowest first.
    pub const ALL: [Tier; 3] = [Tier::District, Tier::Mandal, Tier::Centre];

    /// Depth below the state root (district = 1).
    #[must_use]
    pub fn depth(self) -> u8 {
        match self {
            Self::District => 1,
            Self::Mandal => 2,
            Self::Centre => 3,
        }
    }

    /// The tier directly above, or `None` for districts.
    #[must_use]
    pub fn parent(self) -> Option<Tier> {
        match self {
            Self::District => None,
            Self::Mandal => Some(Self::District),
            Self::Centre => Some(Self::Mandal),
        }
    }

    /// Returns `true` if `self` is strictly shallower than `other`.
    ///
    /// ```
    /// use vigil_types::Tier;
    ///
    /// assert!(Tier::District.is_above(Tier::Centre));
    /// assert!(!Tier::Mandal.is_above(Tier::Mandal));
    /// ```
    #[must_use]
    pub fn is_above(self, other: Tier) -> bool {
        self.depth() < other.depth()
    }

    /// Name of the filter / payload field that carries a node of this tier.
    #[must_use]
    pub fn field_name(self) -> &'static str {
        match self {
            Self::District => "districtId",
            Self::Mandal => "mandalId",
            Self::Centre => "centreId",
        }
    }

    /// Lowercase tier name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::District => "district",
            Self::Mandal => "mandal",
            Self::Centre => "centre",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "district" => Ok(Self::District),
            "mandal" => Ok(Self::Mandal),
            "centre" | "center" => Ok(Self::Centre),
            _ => Err(ParseRoleError(s.to_string())),
        }
    }
}

/// Authorization level of an identity.
///
/// Closed and strictly hierarchical. A role is assigned administratively
/// and never changed by its holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Unrestricted, state-wide.
    SuperAdmin,
    /// Confined to one district.
    DistrictInCharge,
    /// Confined to one mandal.
    MandalInCharge,
    /// Confined to one examination centre.
    CentreInCharge,
}

impl Role {
    /// All roles, most authority first.
    pub const ALL: [Role; 4] = [
        Role::SuperAdmin,
        Role::DistrictInCharge,
        Role::MandalInCharge,
        Role::CentreInCharge,
    ];

    /// The tier this role is confined to, or `None` for `SUPER_ADMIN`.
    ///
    /// ```
    /// use vigil_types::{Role, Tier};
    ///
    /// assert_eq!(Role::SuperAdmin.confining_tier(), None);
    /// assert_eq!(Role::MandalInCharge.confining_tier(), Some(Tier::Mandal));
    /// ```
    #[must_use]
    pub fn confining_tier(self) -> Option<Tier> {
        match self {
            Self::SuperAdmin => None,
            Self::DistrictInCharge => Some(Tier::District),
            Self::MandalInCharge => Some(Tier::Mandal),
            Self::CentreInCharge => Some(Tier::Centre),
        }
    }

    /// Returns `true` for the role with no confining tier.
    #[must_use]
    pub fn is_unrestricted(self) -> bool {
        self.confining_tier().is_none()
    }

    /// Wire name, e.g. `"MANDAL_IN_CHARGE"`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SuperAdmin => "SUPER_ADMIN",
            Self::DistrictInCharge => "DISTRICT_IN_CHARGE",
            Self::MandalInCharge => "MANDAL_IN_CHARGE",
            Self::CentreInCharge => "CENTRE_IN_CHARGE",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseRoleError;

    /// Parses the wire name, case-insensitive, `-` accepted for `_`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.to_uppercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|role| role.as_str() == normalized)
            .ok_or_else(|| ParseRoleError(s.to_string()))
    }
}

/// Error returned when a role or tier name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseRoleError(pub String);

impl std::fmt::Display for ParseRoleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unrecognized role or tier: '{}'", self.0)
    }
}

impl std::error::Error for ParseRoleError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_confined_role_maps_to_distinct_tier() {
        let tiers: Vec<_> = Role::ALL.iter().filter_map(|r| r.confining_tier()).collect();
        assert_eq!(tiers, vec![Tier::District, Tier::Mandal, Tier::Centre]);
        assert!(Role::SuperAdmin.is_unrestricted());
        assert!(!Role::CentreInCharge.is_unrestricted());
    }

    #[test]
    fn tier_parent_chain() {
        assert_eq!(Tier::Centre.parent(), Some(Tier::Mandal));
        assert_eq!(Tier::Mandal.parent(), Some(Tier::District));
        assert_eq!(Tier::District.parent(), None);
    }

    #[test]
    fn tier_is_above_is_strict() {
        assert!(Tier::District.is_above(Tier::Mandal));
        assert!(Tier::Mandal.is_above(Tier::Centre));
        assert!(!Tier::Centre.is_above(Tier::District));
        assert!(!Tier::District.is_above(Tier::District));
    }

    #[test]
    fn role_parse_accepts_variants() {
        assert_eq!("SUPER_ADMIN".parse::<Role>(), Ok(Role::SuperAdmin));
        assert_eq!("mandal-in-charge".parse::<Role>(), Ok(Role::MandalInCharge));
        assert!("ROOT".parse::<Role>().is_err());
    }

    #[test]
    fn role_serde_uses_wire_names() {
        let json = serde_json::to_string(&Role::CentreInCharge).expect("serialize role");
        assert_eq!(json, "\"CENTRE_IN_CHARGE\"");
        let role: Role = serde_json::from_str("\"DISTRICT_IN_CHARGE\"").expect("deserialize role");
        assert_eq!(role, Role::DistrictInCharge);
    }

    #[test]
    fn tier_field_names() {
        assert_eq!(Tier::District.field_name(), "districtId");
        assert_eq!(Tier::Mandal.field_name(), "mandalId");
        assert_eq!(Tier::Centre.field_name(), "centreId");
        assert_eq!("center".parse::<Tier>(), Ok(Tier::Centre));
    }
}
