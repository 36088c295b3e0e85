//! Automatable job parameters.
//!
//! Every job keeps its parameters in a [`Parameters`] table. Kernels declare
//! them once in [`Kernel::describe`](crate::Kernel::describe) and read them
//! during processing; callers change them through [`Job::set`](crate::Job::set).
//! Float parameters can also be driven by another job's output, in which case
//! the driven signal is added to the base value.

use std::sync::Arc;

use dasp_graph::Buffer;

use crate::connection::{Connection, ConnectionInfo};
use crate::error::GraphError;
use crate::job::{JobId, JobKey, Jobs};
use crate::sound::SoundBuffer;

/// A parameter value.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    Float(f32),
    Int(i32),
    Vector3([f32; 3]),
    Vector6([f32; 6]),
    Buffer(Option<Arc<SoundBuffer>>),
}

impl ParamValue {
    /// Name of the value's type, as used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Float(_) => "float",
            ParamValue::Int(_) => "int",
            ParamValue::Vector3(_) => "float3",
            ParamValue::Vector6(_) => "float6",
            ParamValue::Buffer(_) => "buffer",
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match *self {
            ParamValue::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match *self {
            ParamValue::Int(v) => Some(v),
            _ => None,
        }
    }
}

impl From<f32> for ParamValue {
    fn from(v: f32) -> Self {
        ParamValue::Float(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Int(v as i32)
    }
}

impl From<[f32; 3]> for ParamValue {
    fn from(v: [f32; 3]) -> Self {
        ParamValue::Vector3(v)
    }
}

impl From<[f32; 6]> for ParamValue {
    fn from(v: [f32; 6]) -> Self {
        ParamValue::Vector6(v)
    }
}

impl From<Arc<SoundBuffer>> for ParamValue {
    fn from(v: Arc<SoundBuffer>) -> Self {
        ParamValue::Buffer(Some(v))
    }
}

impl From<Option<Arc<SoundBuffer>>> for ParamValue {
    fn from(v: Option<Arc<SoundBuffer>>) -> Self {
        ParamValue::Buffer(v)
    }
}

struct Parameter {
    name: &'static str,
    value: ParamValue,
    range: Option<(f32, f32)>,
    connection: Option<Connection>,
    driven: Buffer,
    changed: bool,
}

/// `b` always equals `a * scale`.
struct Mirror {
    a: usize,
    b: usize,
    scale: f32,
    /// Side that was written last this block.
    authority: Option<usize>,
}

/// A job's parameter table.
#[derive(Default)]
pub struct Parameters {
    params: Vec<Parameter>,
    mirrors: Vec<Mirror>,
    syncing: bool,
}

impl Parameters {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Declare a parameter with no range restriction.
    pub fn add(&mut self, name: &'static str, value: impl Into<ParamValue>) {
        self.push(name, value.into(), None);
    }

    /// Declare a float parameter limited to `min..=max`.
    pub fn add_float(&mut self, name: &'static str, value: f32, min: f32, max: f32) {
        self.push(name, ParamValue::Float(value), Some((min, max)));
    }

    /// Declare an int parameter limited to `min..=max`.
    pub fn add_int(&mut self, name: &'static str, value: i32, min: i32, max: i32) {
        self.push(name, ParamValue::Int(value), Some((min as f32, max as f32)));
    }

    fn push(&mut self, name: &'static str, value: ParamValue, range: Option<(f32, f32)>) {
        if let Some(i) = self.index_of(name) {
            self.params[i].value = value;
            self.params[i].range = range;
            return;
        }
        self.params.push(Parameter {
            name,
            value,
            range,
            connection: None,
            driven: Buffer::default(),
            changed: false,
        });
    }

    /// Keep `b` equal to `a * scale`.
    ///
    /// Setting either side updates the other exactly once. Both must be float
    /// parameters declared beforehand; unknown names are ignored.
    pub fn mirror(&mut self, a: &'static str, b: &'static str, scale: f32) {
        if let (Some(a), Some(b)) = (self.index_of(a), self.index_of(b)) {
            self.mirrors.push(Mirror {
                a,
                b,
                scale,
                authority: None,
            });
        }
    }

    #[inline]
    fn index_of(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p.name == name)
    }

    fn find(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }

    fn require(&self, name: &str) -> Result<usize, GraphError> {
        self.index_of(name)
            .ok_or_else(|| GraphError::UnknownParameter(name.to_owned()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.params.iter().map(|p| p.name)
    }

    /// Current value of a float parameter plus the driving signal's first frame.
    pub fn float(&self, name: &str) -> f32 {
        self.float_at(name, 0)
    }

    /// Current value of a float parameter plus the driving signal at `frame`.
    pub fn float_at(&self, name: &str, frame: usize) -> f32 {
        match self.find(name) {
            Some(p) => {
                let base = p.value.as_float().unwrap_or(0.0);
                match p.connection {
                    Some(_) => base + p.driven.get(frame).copied().unwrap_or(0.0),
                    None => base,
                }
            }
            None => 0.0,
        }
    }

    /// Whether a float parameter is currently driven by a connection.
    pub fn is_driven(&self, name: &str) -> bool {
        self.find(name)
            .map_or(false, |p| p.connection.as_ref().map_or(false, Connection::is_connected))
    }

    pub fn int(&self, name: &str) -> i32 {
        self.find(name).and_then(|p| p.value.as_int()).unwrap_or(0)
    }

    pub fn flag(&self, name: &str) -> bool {
        self.int(name) != 0
    }

    pub fn vector3(&self, name: &str) -> [f32; 3] {
        match self.find(name).map(|p| &p.value) {
            Some(ParamValue::Vector3(v)) => *v,
            _ => [0.0; 3],
        }
    }

    pub fn vector6(&self, name: &str) -> [f32; 6] {
        match self.find(name).map(|p| &p.value) {
            Some(ParamValue::Vector6(v)) => *v,
            _ => [0.0; 6],
        }
    }

    pub fn buffer(&self, name: &str) -> Option<&Arc<SoundBuffer>> {
        match self.find(name).map(|p| &p.value) {
            Some(ParamValue::Buffer(b)) => b.as_ref(),
            _ => None,
        }
    }

    /// Whether the parameter was set since the owning job last prepared.
    pub fn was_changed(&self, name: &str) -> bool {
        self.find(name).map_or(false, |p| p.changed)
    }

    pub fn any_changed(&self) -> bool {
        self.params.iter().any(|p| p.changed)
    }

    /// For a mirrored pair, the side that was written last this block.
    pub fn mirror_authority(&self, name: &str) -> Option<&'static str> {
        let i = self.index_of(name)?;
        self.mirrors
            .iter()
            .find(|m| m.a == i || m.b == i)
            .and_then(|m| m.authority)
            .map(|side| self.params[side].name)
    }

    pub(crate) fn get(&self, name: &str) -> Result<ParamValue, GraphError> {
        let i = self.require(name)?;
        Ok(self.params[i].value.clone())
    }

    pub(crate) fn set(&mut self, name: &str, value: ParamValue) -> Result<(), GraphError> {
        let i = self.require(name)?;
        self.check(i, &value)?;
        self.assign(i, value);

        if !self.syncing {
            self.syncing = true;
            for m in 0..self.mirrors.len() {
                let Mirror { a, b, scale, .. } = self.mirrors[m];
                let (other, derived) = if i == a {
                    (b, self.params[a].value.as_float().map(|v| v * scale))
                } else if i == b && scale != 0.0 {
                    (a, self.params[b].value.as_float().map(|v| v / scale))
                } else {
                    continue;
                };
                if let Some(v) = derived {
                    self.assign(other, ParamValue::Float(v));
                }
                self.mirrors[m].authority = Some(i);
            }
            self.syncing = false;
        }
        Ok(())
    }

    fn check(&self, i: usize, value: &ParamValue) -> Result<(), GraphError> {
        let p = &self.params[i];
        if std::mem::discriminant(&p.value) != std::mem::discriminant(value) {
            return Err(GraphError::ParameterType {
                name: p.name.to_owned(),
                expected: p.value.type_name(),
            });
        }
        if let Some((min, max)) = p.range {
            let v = match *value {
                ParamValue::Float(v) => v,
                ParamValue::Int(v) => v as f32,
                _ => return Ok(()),
            };
            if !(min..=max).contains(&v) {
                return Err(GraphError::Range(format!(
                    "{} = {} is outside {}..={}",
                    p.name, v, min, max
                )));
            }
        }
        Ok(())
    }

    #[inline]
    fn assign(&mut self, i: usize, value: ParamValue) {
        let p = &mut self.params[i];
        p.value = value;
        p.changed = true;
    }

    /// Drive a float parameter from an upstream output.
    pub(crate) fn connect(
        &mut self,
        name: &str,
        key: Arc<JobKey>,
        output: usize,
    ) -> Result<(), GraphError> {
        let i = self.require(name)?;
        let p = &mut self.params[i];
        if !matches!(p.value, ParamValue::Float(_)) {
            return Err(GraphError::ParameterType {
                name: p.name.to_owned(),
                expected: "float",
            });
        }
        p.connection
            .get_or_insert_with(|| Connection::new(0, 1))
            .connect(key, output);
        Ok(())
    }

    pub(crate) fn disconnect(&mut self, name: &str) -> Result<(), GraphError> {
        let i = self.require(name)?;
        self.params[i].connection = None;
        Ok(())
    }

    pub(crate) fn connection_info(&self, name: &str) -> Result<Option<ConnectionInfo>, GraphError> {
        let i = self.require(name)?;
        Ok(self.params[i].connection.as_ref().map(Connection::info))
    }

    pub(crate) fn visit_inputs(
        &self,
        f: &mut dyn FnMut(JobId) -> Result<(), GraphError>,
    ) -> Result<(), GraphError> {
        for conn in self.params.iter().filter_map(|p| p.connection.as_ref()) {
            conn.visit_inputs(f)?;
        }
        Ok(())
    }

    /// Pull every driving connection into its parameter's signal buffer.
    pub(crate) fn gather(&mut self, jobs: &Jobs, frames: usize) {
        for p in self.params.iter_mut() {
            if let Some(conn) = &p.connection {
                conn.gather(jobs, std::slice::from_mut(&mut p.driven), frames);
            }
        }
    }

    /// End the block: forget which parameters changed.
    pub(crate) fn clear_changed(&mut self) {
        for p in self.params.iter_mut() {
            p.changed = false;
        }
        for m in self.mirrors.iter_mut() {
            m.authority = None;
        }
    }
}
