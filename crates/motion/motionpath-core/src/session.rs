//! Caller-owned registry of loaded motions and registration curves.

use std::path::Path;

use hashbrown::HashMap;

use crate::cancel::CancelToken;
use crate::concat::concatenate;
use crate::config::Config;
use crate::error::{MotionError, Result};
use crate::motion::Motion;
use crate::registration::{registration_name, BlendWeights, RegistrationCurve};

/// Motions and registration curves keyed by unique name. Listing preserves
/// insertion order.
#[derive(Debug, Default)]
pub struct Session {
    cfg: Config,
    motions: HashMap<String, Motion>,
    motion_order: Vec<String>,
    registrations: HashMap<String, RegistrationCurve>,
    registration_order: Vec<String>,
}

impl Session {
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Replace the configuration used by later loads and operations.
    pub fn set_config(&mut self, cfg: Config) -> Result<()> {
        cfg.validate()?;
        self.cfg = cfg;
        Ok(())
    }

    pub fn add_motion(&mut self, motion: Motion) -> Result<&mut Motion> {
        let name = motion.name().to_string();
        if self.motions.contains_key(&name) {
            return Err(MotionError::InvalidInput(format!(
                "a motion named '{name}' already exists"
            )));
        }
        self.motion_order.push(name.clone());
        Ok(self.motions.entry(name).or_insert(motion))
    }

    pub fn motion(&self, name: &str) -> Result<&Motion> {
        self.motions
            .get(name)
            .ok_or_else(|| MotionError::UnknownMotion(name.to_string()))
    }

    pub fn motion_mut(&mut self, name: &str) -> Result<&mut Motion> {
        self.motions
            .get_mut(name)
            .ok_or_else(|| MotionError::UnknownMotion(name.to_string()))
    }

    pub fn remove_motion(&mut self, name: &str) -> Result<Motion> {
        let motion = self
            .motions
            .remove(name)
            .ok_or_else(|| MotionError::UnknownMotion(name.to_string()))?;
        self.motion_order.retain(|n| n != name);
        Ok(motion)
    }

    pub fn motion_names(&self) -> Vec<&str> {
        self.motion_order.iter().map(String::as_str).collect()
    }

    /// Load a BVH file; the motion takes the file's name.
    pub fn load_bvh(&mut self, path: impl AsRef<Path>) -> Result<&mut Motion> {
        let motion = Motion::from_file(path, &self.cfg)?;
        self.add_motion(motion)
    }

    pub fn load_bvh_str(&mut self, name: &str, text: &str) -> Result<&mut Motion> {
        let motion = Motion::from_bvh_str(name, text, &self.cfg)?;
        self.add_motion(motion)
    }

    /// Concatenate two registered motions into a new one named `"a$b"`.
    pub fn concatenate(&mut self, a: &str, b: &str) -> Result<&mut Motion> {
        let joined = concatenate(self.motion(a)?, self.motion(b)?, &self.cfg.concat)?;
        self.add_motion(joined)
    }

    /// Register `b` against `a` under the name `"a_blend_b"`.
    pub fn register_blend(&mut self, a: &str, b: &str, cancel: &CancelToken) -> Result<&mut RegistrationCurve> {
        let name = registration_name(a, b);
        if self.registrations.contains_key(&name) {
            return Err(MotionError::InvalidInput(format!(
                "a registration named '{name}' already exists"
            )));
        }
        let curve = RegistrationCurve::build(
            &name,
            self.motion(a)?,
            self.motion(b)?,
            &self.cfg.registration,
            cancel,
        )?;
        self.registration_order.push(name.clone());
        Ok(self.registrations.entry(name).or_insert(curve))
    }

    pub fn registration(&self, name: &str) -> Result<&RegistrationCurve> {
        self.registrations
            .get(name)
            .ok_or_else(|| MotionError::UnknownRegistration(name.to_string()))
    }

    pub fn registration_mut(&mut self, name: &str) -> Result<&mut RegistrationCurve> {
        self.registrations
            .get_mut(name)
            .ok_or_else(|| MotionError::UnknownRegistration(name.to_string()))
    }

    pub fn remove_registration(&mut self, name: &str) -> Result<RegistrationCurve> {
        let curve = self
            .registrations
            .remove(name)
            .ok_or_else(|| MotionError::UnknownRegistration(name.to_string()))?;
        self.registration_order.retain(|n| n != name);
        Ok(curve)
    }

    pub fn registration_names(&self) -> Vec<&str> {
        self.registration_order.iter().map(String::as_str).collect()
    }

    /// Blend along a registration and add the result as a new motion on
    /// motion A's skeleton, keeping A's frame time.
    pub fn blend_to_motion(&mut self, registration: &str, weights: &BlendWeights, name: &str) -> Result<&mut Motion> {
        let curve = self.registration(registration)?;
        let (a, _) = curve.motion_names();
        let template = self.motion(a)?;
        let blended = curve.blend(weights)?;
        let motion = blended.to_motion(name, template, template.frame_time())?;
        self.add_motion(motion)
    }
}
