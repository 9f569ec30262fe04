/*!
# Object BVH

Bounding volume hierarchy over the renderable entities of a scene.

The index works at the entity level rather than the triangle level: every
drawn instance (a single mesh, one instance of an instanced entity, or one
slot of a batched entity) becomes one primitive of the hierarchy. Each
primitive is a packed 32-bit ID that decodes back to its entity and
instance without a lookup table.

## Architecture

- **Scene**: host scene graph (entities, geometries) the index reads from
- **EntitySet**: deduplicated, order-stable drawable entities
- **PrimitiveTable**: flat buffer of packed primitive IDs
- **BoundsExtractor**: conservative per-primitive bounds, cached per geometry
- **BvhTree**: generic hierarchy fed through the `PrimitiveSource` trait
- **ObjectBvh**: construction, shapecast, raycast, queries and refit

## Example

```no_run
use object_bvh::glam::{Mat4, Vec3};
use object_bvh::math::Ray;
use object_bvh::scene::{Geometry, Scene};
use object_bvh::{ObjectBvh, ObjectBvhDesc};

let mut scene = Scene::new();
let cube = scene.add_geometry(Geometry::cuboid("cube", Vec3::ONE));
let root = scene.create_group("root", Mat4::IDENTITY);
let crowd = scene.create_instanced("crowd", cube, Mat4::IDENTITY, vec![Mat4::IDENTITY; 64]);
scene.add_child(root, crowd);

let mut bvh = ObjectBvh::from_root(&scene, root, ObjectBvhDesc::default())?;
let mut hits = Vec::new();
bvh.raycast(&scene, &Ray::new(Vec3::new(0.0, 0.0, 10.0), Vec3::NEG_Z), &mut hits)?;
# Ok::<(), object_bvh::Error>(())
```
*/

// Internal modules
mod error;
pub mod log;
pub mod math;
pub mod scene;
pub mod bvh;

// Error types
pub use error::{Error, Result};

// Main entry points
pub use bvh::{
    ObjectBvh, ObjectBvhDesc, ObjectShapecast, PrimitiveHit, RaycastHit, BvhDiagnostics,
};

// Re-export math library at crate root
pub use glam;
