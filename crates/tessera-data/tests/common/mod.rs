// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![allow(dead_code)]

use bytemuck::{Pod, Zeroable};
use std::sync::Arc;
use tessera_core::{InlineWorkerPool, MemoryPool, WorkerPool};
use tessera_data::{FrameReport, IndexedBufferHandle, IndexedBufferManager, ManagerConfig};
use tessera_infra::{impl_record_source, HostDevice, ObjectStore, ThreadWorkerPool, TransformStore};

// --- SCENE RECORDS ---
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mesh {
    pub vertex_offset: u32,
    pub index_count: u32,
    pub visible: bool,
}

impl Mesh {
    pub fn new(vertex_offset: u32, index_count: u32) -> Self {
        Self {
            vertex_offset,
            index_count,
            visible: true,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct MeshGpu {
    pub vertex_offset: u32,
    pub index_count: u32,
}

pub fn mesh_gpu(mesh: &Mesh) -> MeshGpu {
    MeshGpu {
        vertex_offset: mesh.vertex_offset,
        index_count: mesh.index_count,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: [f32; 3],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TransformGpu {
    pub translation: [f32; 3],
    pub _pad: f32,
}

pub fn transform_gpu(transform: &Transform) -> TransformGpu {
    TransformGpu {
        translation: transform.translation,
        _pad: 0.0,
    }
}

#[derive(Debug, Default)]
pub struct Scene {
    pub meshes: ObjectStore<Mesh>,
    pub transforms: TransformStore<Transform>,
}

impl_record_source!(Scene {
    meshes: ObjectStore<Mesh>,
    transforms: TransformStore<Transform>,
});

impl Scene {
    pub fn end_frame(&self) {
        self.meshes.end_frame();
        self.transforms.end_frame();
    }
}

// --- HARNESS ---
pub struct Harness {
    pub device: Arc<HostDevice>,
    pub manager: IndexedBufferManager<Scene>,
}

impl Harness {
    /// `workers == 0` runs every update inline.
    pub fn new(config: ManagerConfig, workers: usize) -> Self {
        let device = Arc::new(HostDevice::new());
        let pool: Arc<dyn WorkerPool> = if workers == 0 {
            Arc::new(InlineWorkerPool)
        } else {
            Arc::new(ThreadWorkerPool::new(workers).expect("spawn workers"))
        };
        let manager = IndexedBufferManager::new(
            Arc::new(Scene::default()),
            device.clone(),
            pool,
            config,
        )
        .expect("valid config");
        Self { device, manager }
    }

    pub fn scene(&self) -> &Scene {
        self.manager.source()
    }

    pub fn add_meshes(&mut self) -> IndexedBufferHandle {
        self.manager
            .add_indexed_buffer("Meshes", mesh_gpu, MemoryPool::DeviceLocal, None)
            .expect("fallback array")
    }

    pub fn add_transforms(&mut self) -> IndexedBufferHandle {
        self.manager
            .add_indexed_buffer("Transforms", transform_gpu, MemoryPool::DeviceLocal, None)
            .expect("fallback array")
    }

    /// Updates the manager, closes the scene's diff and advances the device.
    pub fn frame(&mut self) -> anyhow::Result<FrameReport> {
        let report = self.manager.update()?;
        self.scene().end_frame();
        self.device.advance_frame();
        Ok(report)
    }
}
