//! Generation options and per-run state.

use std::any::Any;
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::shader_graph::NodeId;
use super::target::Target;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShaderInterfaceType {
    /// Every editable unconnected input becomes a uniform.
    #[default]
    Complete,
    /// Only graph-level inputs and textures become uniforms; everything else
    /// is inlined as a literal.
    Reduced,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecularEnvironmentMethod {
    None,
    #[default]
    Prefilter,
    Fis,
}

/// Options controlling one generation run.
///
/// Deserialized from the `--options` JSON file with camelCase keys; every key
/// is optional.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenOptions {
    pub shader_interface_type: ShaderInterfaceType,
    /// Flip the V texture coordinate in `mx_transform_uv`.
    pub file_texture_vertical_flip: bool,
    /// Derive output alpha from surface transparency.
    pub hw_transparency: bool,
    pub hw_specular_environment_method: SpecularEnvironmentMethod,
    pub hw_max_active_light_sources: u32,
    /// Normalize UDIM texture coordinates through `$udimScaleAndOffset`.
    pub hw_normalize_udim_tex_coords: bool,
    /// Replace the pixel output with depth moments for shadow map rendering.
    pub hw_write_depth_moments: bool,
    pub hw_shadow_map: bool,
    pub hw_ambient_occlusion: bool,
    pub hw_srgb_encode_output: bool,
    /// Compute bitangents from normal and tangent instead of a vertex input.
    pub hw_implicit_bitangents: bool,
    /// Rasterize in texture space (`gl_Position` from UV0).
    pub texture_space_render: bool,
    pub constant_folding: bool,
}

impl Default for GenOptions {
    fn default() -> Self {
        Self {
            shader_interface_type: ShaderInterfaceType::Complete,
            file_texture_vertical_flip: false,
            hw_transparency: false,
            hw_specular_environment_method: SpecularEnvironmentMethod::Prefilter,
            hw_max_active_light_sources: 3,
            hw_normalize_udim_tex_coords: false,
            hw_write_depth_moments: false,
            hw_shadow_map: false,
            hw_ambient_occlusion: false,
            hw_srgb_encode_output: false,
            hw_implicit_bitangents: true,
            texture_space_render: false,
            constant_folding: true,
        }
    }
}

const BOUND_LIGHTS_KEY: &str = "boundLightShaders";

/// Light shader nodedefs bound to numeric light type ids, in binding order.
#[derive(Clone, Debug, Default)]
pub struct BoundLightShaders(pub Vec<(u32, String)>);

/// Mutable state for one generation run. Not shared between concurrent runs.
pub struct GenContext {
    pub options: GenOptions,
    target: Option<Target>,
    emitted: HashSet<(String, NodeId)>,
    user_data: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl Default for GenContext {
    fn default() -> Self {
        Self::new(GenOptions::default())
    }
}

impl GenContext {
    pub fn new(options: GenOptions) -> Self {
        Self {
            options,
            target: None,
            emitted: HashSet::new(),
            user_data: HashMap::new(),
        }
    }

    /// Target of the run in progress, if any.
    pub fn target(&self) -> Option<Target> {
        self.target
    }

    /// Reset per-run caches. User data survives so bound lights carry over.
    pub(crate) fn begin_run(&mut self, target: Target) {
        self.target = Some(target);
        self.emitted.clear();
    }

    /// Mark `node` as emitted in `stage`. Returns `false` if it already was.
    pub fn mark_emitted(&mut self, stage: &str, node: NodeId) -> bool {
        self.emitted.insert((stage.to_string(), node))
    }

    pub fn is_emitted(&self, stage: &str, node: NodeId) -> bool {
        self.emitted.contains(&(stage.to_string(), node))
    }

    pub fn set_user_data<T: Any + Send + Sync>(&mut self, key: &str, data: T) {
        self.user_data.insert(key.to_string(), Box::new(data));
    }

    pub fn user_data<T: Any + Send + Sync>(&self, key: &str) -> Option<&T> {
        self.user_data.get(key).and_then(|d| d.downcast_ref::<T>())
    }

    pub fn user_data_mut<T: Any + Send + Sync>(&mut self, key: &str) -> Option<&mut T> {
        self.user_data
            .get_mut(key)
            .and_then(|d| d.downcast_mut::<T>())
    }

    pub fn remove_user_data(&mut self, key: &str) {
        self.user_data.remove(key);
    }

    /// Bind a light shader nodedef to a light type id. Hardware generators emit
    /// its function and a `sampleLightSource` dispatch case for it.
    pub fn bind_light_shader(&mut self, type_id: u32, nodedef: &str) {
        if self.user_data::<BoundLightShaders>(BOUND_LIGHTS_KEY).is_none() {
            self.set_user_data(BOUND_LIGHTS_KEY, BoundLightShaders::default());
        }
        if let Some(bound) = self.user_data_mut::<BoundLightShaders>(BOUND_LIGHTS_KEY) {
            bound.0.retain(|(id, _)| *id != type_id);
            bound.0.push((type_id, nodedef.to_string()));
        }
    }

    pub fn unbind_light_shaders(&mut self) {
        self.remove_user_data(BOUND_LIGHTS_KEY);
    }

    pub fn bound_light_shaders(&self) -> &[(u32, String)] {
        self.user_data::<BoundLightShaders>(BOUND_LIGHTS_KEY)
            .map(|b| b.0.as_slice())
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_partial_json() {
        let opts: GenOptions = serde_json::from_str(
            r#"{ "shaderInterfaceType": "reduced", "hwMaxActiveLightSources": 8 }"#,
        )
        .unwrap();
        assert_eq!(opts.shader_interface_type, ShaderInterfaceType::Reduced);
        assert_eq!(opts.hw_max_active_light_sources, 8);
        assert!(opts.constant_folding);
        assert!(opts.hw_implicit_bitangents);
    }

    #[test]
    fn test_emitted_cache_per_stage() {
        let mut ctx = GenContext::default();
        assert!(ctx.mark_emitted("pixel", 3));
        assert!(!ctx.mark_emitted("pixel", 3));
        assert!(ctx.mark_emitted("vertex", 3));
        ctx.begin_run(Target::Glsl);
        assert!(!ctx.is_emitted("pixel", 3));
    }

    #[test]
    fn test_bound_lights_replace_by_id() {
        let mut ctx = GenContext::default();
        ctx.bind_light_shader(1, "point_light");
        ctx.bind_light_shader(2, "directional_light");
        ctx.bind_light_shader(1, "spot_light");
        assert_eq!(
            ctx.bound_light_shaders(),
            &[
                (2, "directional_light".to_string()),
                (1, "spot_light".to_string())
            ]
        );
        ctx.unbind_light_shaders();
        assert!(ctx.bound_light_shaders().is_empty());
    }
}
