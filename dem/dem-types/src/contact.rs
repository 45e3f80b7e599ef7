//! Contact partner and contact candidate records.
//!
//! A contact partner is a weak reference from one body to another it is
//! currently adhered to. The relation is symmetric: if A lists B then B
//! lists A, with a negated contact vector. Both sides are always mutated
//! in the same transaction; a body removed from its collection is removed
//! from every partner's list before control returns.

use nalgebra::{UnitQuaternion, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::ids::BodyKey;

/// Weak reference to an adhered/contacting body.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactPartner {
    /// Key of the partner body. A lookup must re-validate it; the partner
    /// may have been removed on a later step.
    pub key: BodyKey,
    /// Vector from this body's center of gravity to the contact point.
    pub contact_vector: Vector3<f64>,
    /// Contact normal, pointing from this body toward the partner.
    pub normal: Vector3<f64>,
    /// Face indices of the originating pair: (own face, partner face).
    pub faces: (u32, u32),
    /// Contact area at bond formation (m²).
    pub area: f64,
}

impl ContactPartner {
    /// Rotate the direction-dependent fields by a rigid-body rotation.
    ///
    /// Called whenever the owning body rotates, so the bond geometry stays
    /// expressed in world coordinates.
    pub fn rotate(&mut self, rotation: &UnitQuaternion<f64>) {
        self.contact_vector = rotation * self.contact_vector;
        self.normal = rotation * self.normal;
    }
}

/// Relative kinematics of a tracked face pair.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactKinematics {
    /// Distance along the contact normal (m); negative when penetrating.
    pub normal_distance: f64,
    /// Distance in the contact plane (m).
    pub tangential_distance: f64,
    /// Approach speed along the normal (m/s).
    pub normal_velocity: f64,
    /// Sliding speed in the contact plane (m/s).
    pub tangential_velocity: f64,
}

/// Lifecycle of a contact candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ContactPhase {
    /// Faces within the proximity threshold, not yet in force contact.
    Candidate,
    /// Forces are being applied through this pair.
    Established,
    /// Bond broken; kept one step for bookkeeping, then discarded.
    Released,
}

/// A pair of nearby mesh faces tracked for possible force application.
///
/// Candidates are rank-local and never exchanged. The key is symmetric:
/// `(a, b)` and `(b, a)` normalize to the same candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactCandidate {
    /// First (body, face) endpoint, canonically the smaller body key.
    pub a: (BodyKey, u32),
    /// Second (body, face) endpoint.
    pub b: (BodyKey, u32),
    /// Cached relative kinematics from the last evaluation.
    pub kinematics: ContactKinematics,
    /// Contact area estimate used for the retention threshold (m²).
    pub area: f64,
    /// Current lifecycle phase.
    pub phase: ContactPhase,
}

impl ContactCandidate {
    /// Create a candidate with a normalized (symmetric) endpoint order.
    #[must_use]
    pub fn new(a: (BodyKey, u32), b: (BodyKey, u32), area: f64) -> Self {
        let (a, b) = Self::normalize(a, b);
        Self {
            a,
            b,
            kinematics: ContactKinematics::default(),
            area,
            phase: ContactPhase::Candidate,
        }
    }

    /// Normalized endpoint pair, usable as a map key.
    #[must_use]
    pub fn normalize(
        a: (BodyKey, u32),
        b: (BodyKey, u32),
    ) -> ((BodyKey, u32), (BodyKey, u32)) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// Whether the candidate has drifted past its retention threshold.
    ///
    /// A candidate is discarded once the face separation exceeds
    /// `contact_radius_factor × sqrt(contact area)`.
    #[must_use]
    pub fn is_stale(&self, contact_radius_factor: f64) -> bool {
        self.kinematics.normal_distance > contact_radius_factor * self.area.max(0.0).sqrt()
    }
}
