//! Trajectory point and its attributes

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

// Internal
use super::PointError;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// One point of a planned joint trajectory.
///
/// Each of the position, velocity and acceleration fields has its own validity flag. A field
/// which is not valid yet can be filled in once with [`TrajectoryPoint::set`], after which it
/// cannot be changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrajectoryPoint {
    /// Time of this point from the start of the trajectory.
    ///
    /// Units: seconds
    pub time_s: f64,

    q: DVector<f64>,
    v: DVector<f64>,
    a: DVector<f64>,

    position_valid: bool,
    velocity_valid: bool,
    acceleration_valid: bool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// The fields of a trajectory point which carry a validity flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PointAttribute {
    Position,
    Velocity,
    Acceleration,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PointAttribute {
    /// Every attribute, needed before a point can be used as a reference.
    pub const ALL: [PointAttribute; 3] = [
        PointAttribute::Position,
        PointAttribute::Velocity,
        PointAttribute::Acceleration,
    ];
}

impl TrajectoryPoint {
    /// Create a point with all attributes valid.
    pub fn new(time_s: f64, q: DVector<f64>, v: DVector<f64>, a: DVector<f64>) -> Self {
        Self {
            time_s,
            q,
            v,
            a,
            position_valid: true,
            velocity_valid: true,
            acceleration_valid: true,
        }
    }

    /// Create a point of the given dimensions with no attribute valid yet.
    pub fn empty(time_s: f64, nq: usize, nv: usize) -> Self {
        Self {
            time_s,
            q: DVector::zeros(nq),
            v: DVector::zeros(nv),
            a: DVector::zeros(nv),
            position_valid: false,
            velocity_valid: false,
            acceleration_valid: false,
        }
    }

    /// Fill in an attribute which is not yet valid.
    pub fn set(&mut self, attribute: PointAttribute, values: DVector<f64>) -> Result<(), PointError> {
        if self.is_valid(attribute) {
            return Err(PointError::AttributeAlreadySet(attribute));
        }

        let (field, valid) = match attribute {
            PointAttribute::Position => (&mut self.q, &mut self.position_valid),
            PointAttribute::Velocity => (&mut self.v, &mut self.velocity_valid),
            PointAttribute::Acceleration => (&mut self.a, &mut self.acceleration_valid),
        };

        if field.len() != values.len() {
            return Err(PointError::WrongLength {
                attribute,
                expected: field.len(),
                found: values.len(),
            });
        }

        *field = values;
        *valid = true;

        Ok(())
    }

    /// Returns true if the given attribute has been filled in.
    pub fn is_valid(&self, attribute: PointAttribute) -> bool {
        match attribute {
            PointAttribute::Position => self.position_valid,
            PointAttribute::Velocity => self.velocity_valid,
            PointAttribute::Acceleration => self.acceleration_valid,
        }
    }

    /// Returns true if every one of the given attributes has been filled in.
    pub fn is_valid_for(&self, attributes: &[PointAttribute]) -> bool {
        attributes.iter().all(|a| self.is_valid(*a))
    }

    /// Joint positions.
    pub fn q(&self) -> &DVector<f64> {
        &self.q
    }

    /// Joint velocities.
    pub fn v(&self) -> &DVector<f64> {
        &self.v
    }

    /// Joint accelerations.
    pub fn a(&self) -> &DVector<f64> {
        &self.a
    }

    /// The state `x = [q, v]` of this point.
    pub fn state(&self) -> DVector<f64> {
        DVector::from_iterator(
            self.q.len() + self.v.len(),
            self.q.iter().chain(self.v.iter()).copied(),
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_point_attributes_fill_once() {
        let mut point = TrajectoryPoint::empty(0.0, 2, 2);
        assert!(!point.is_valid_for(&[PointAttribute::Position]));

        point
            .set(PointAttribute::Position, DVector::from_vec(vec![1.0, 2.0]))
            .unwrap();
        assert!(point.is_valid(PointAttribute::Position));
        assert!(!point.is_valid_for(&PointAttribute::ALL));

        // Already valid attributes are immutable
        assert_eq!(
            point.set(PointAttribute::Position, DVector::zeros(2)),
            Err(PointError::AttributeAlreadySet(PointAttribute::Position))
        );
        assert_eq!(point.q(), &DVector::from_vec(vec![1.0, 2.0]));

        assert_eq!(
            point.set(PointAttribute::Velocity, DVector::zeros(3)),
            Err(PointError::WrongLength {
                attribute: PointAttribute::Velocity,
                expected: 2,
                found: 3
            })
        );
        assert!(!point.is_valid(PointAttribute::Velocity));
    }

    #[test]
    fn test_state_is_position_then_velocity() {
        let point = TrajectoryPoint::new(
            0.0,
            DVector::from_vec(vec![1.0, 2.0]),
            DVector::from_vec(vec![3.0, 4.0]),
            DVector::zeros(2),
        );

        assert_eq!(point.state(), DVector::from_vec(vec![1.0, 2.0, 3.0, 4.0]));
    }
}
