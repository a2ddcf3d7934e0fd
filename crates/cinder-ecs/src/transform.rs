//! The built-in [`Transform`] component.
//!
//! A transform carries the local translation/rotation/scale an entity is
//! edited through, plus two cached matrices: `local` (built from TRS) and
//! `world` (`parent.world * local`). The matrices are only refreshed by
//! [`Scene::update_hierarchy`](crate::scene::Scene::update_hierarchy).

use bytemuck_derive::{Pod, Zeroable};
use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Local TRS plus cached local and world matrices.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Transform {
    /// World matrix as of the last hierarchy update.
    pub world: Mat4,
    /// Local matrix as of the last hierarchy update.
    pub local: Mat4,
    pub rotation: Quat,
    pub translation: Vec3,
    #[serde(skip)]
    _pad0: f32,
    pub scale: Vec3,
    #[serde(skip)]
    _pad1: f32,
}

impl Transform {
    /// Identity transform (origin, no rotation, unit scale).
    pub const IDENTITY: Self = Self {
        world: Mat4::IDENTITY,
        local: Mat4::IDENTITY,
        rotation: Quat::IDENTITY,
        translation: Vec3::ZERO,
        _pad0: 0.0,
        scale: Vec3::ONE,
        _pad1: 0.0,
    };

    /// Build from translation, rotation and scale. Matrices start stale.
    pub fn from_trs(translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            translation,
            rotation,
            scale,
            ..Self::IDENTITY
        }
    }

    /// A transform at the given position.
    pub fn from_xyz(x: f32, y: f32, z: f32) -> Self {
        Self::from_trs(Vec3::new(x, y, z), Quat::IDENTITY, Vec3::ONE)
    }

    /// Return a copy with uniform scale applied.
    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = Vec3::splat(scale);
        self
    }

    /// Return a copy with the given rotation.
    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    /// Compute the local matrix from the current TRS.
    pub fn compute_local(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    /// Refresh `local` from TRS and `world` from the given parent world
    /// matrix (or `local` alone for a root).
    pub fn recompute(&mut self, parent_world: Option<Mat4>) {
        self.local = self.compute_local();
        self.world = match parent_world {
            Some(parent) => parent * self.local,
            None => self.local,
        };
    }

    /// World-space position as of the last hierarchy update.
    pub fn world_translation(&self) -> Vec3 {
        self.world.w_axis.truncate()
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}
