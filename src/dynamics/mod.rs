//! Simulation dynamics: integration, joints, contact constraints and the solver.

pub mod contact_constraint;
pub mod integrator;
pub mod joints;
pub mod solver;

pub use contact_constraint::ContactConstraint;
pub use integrator::Integrator;
pub use joints::{
    BallAndSocketJoint, DistanceJoint, Joint, JointAnchors, JointDesc, JointHandle, JointKind,
};
pub use solver::{
    Constraint, ConstraintSolver, SolverBody, SolverSettings, SolverStepData, SolverStepMetrics,
};
