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

//! Drives a few frames of a synthetic scene through the indexed-buffer manager.
//!
//! Run with `RUST_LOG=debug` to see rebuilds and arena resizes.

use anyhow::Context;
use bytemuck::{Pod, Zeroable};
use std::sync::Arc;
use tessera_core::{MemoryPool, RecordId, TransformId};
use tessera_data::{IndexedBufferManager, LutRecord, ManagerConfig};
use tessera_infra::{impl_record_source, HostDevice, ObjectStore, ThreadWorkerPool, TransformStore};

#[derive(Debug, Clone, Copy)]
struct Mesh {
    first_index: u32,
    index_count: u32,
    material: u32,
}

#[derive(Debug, Clone, Copy)]
struct Transform {
    position: [f32; 3],
    scale: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct MeshGpu {
    first_index: u32,
    index_count: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct TransformGpu {
    position_scale: [f32; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct DrawLut {
    mesh: u32,
    transform: u32,
    material: u32,
}

impl LutRecord for DrawLut {
    const NAME: &'static str = "DrawLut";
}

#[derive(Debug, Default)]
struct Scene {
    meshes: ObjectStore<Mesh>,
    transforms: TransformStore<Transform>,
}

impl_record_source!(Scene {
    meshes: ObjectStore<Mesh>,
    transforms: TransformStore<Transform>,
});

/// Spawns `count` objects starting at `first`, each with its own transform.
fn spawn(scene: &Scene, first: u32, count: u32) {
    for id in first..first + count {
        scene.meshes.insert(
            RecordId(id),
            Mesh {
                first_index: id * 36,
                index_count: 36,
                material: id % 4,
            },
        );
        scene.transforms.insert(
            TransformId(id),
            Transform {
                position: [id as f32, 0.0, 0.0],
                scale: 1.0,
            },
        );
        scene.transforms.link(RecordId(id), TransformId(id));
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let device = Arc::new(HostDevice::new());
    let workers = Arc::new(ThreadWorkerPool::with_available_parallelism()?);
    let mut manager = IndexedBufferManager::new(
        Arc::new(Scene::default()),
        device.clone(),
        workers,
        ManagerConfig::default(),
    )?;

    let meshes = manager.add_indexed_buffer(
        "Meshes",
        |mesh: &Mesh| MeshGpu {
            first_index: mesh.first_index,
            index_count: mesh.index_count,
        },
        MemoryPool::DeviceLocal,
        None,
    )?;
    let transforms = manager.add_indexed_buffer(
        "Transforms",
        |t: &Transform| TransformGpu {
            position_scale: [t.position[0], t.position[1], t.position[2], t.scale],
        },
        MemoryPool::DeviceLocal,
        None,
    )?;
    manager.register_lut_writer::<DrawLut>(meshes, |slot, lut| lut.mesh = slot);
    manager.register_lut_writer::<DrawLut>(transforms, |slot, lut| lut.transform = slot);

    spawn(manager.source(), 0, 100);

    for frame in 0..12u32 {
        let scene = manager.source();
        match frame {
            3 => spawn(scene, 100, 150),
            6 => {
                for id in (0..250).step_by(2) {
                    scene.meshes.remove(RecordId(id));
                    scene.transforms.remove(TransformId(id));
                    scene.transforms.unlink(RecordId(id));
                }
            }
            _ => {
                for id in 0..10 {
                    scene.transforms.modify(TransformId(id + frame), |t| t.position[1] += 1.0);
                }
            }
        }

        let report = manager.update().context("buffer update failed")?;
        manager.source().meshes.end_frame();
        manager.source().transforms.end_frame();

        let visible: Vec<RecordId> = (0..250).map(RecordId).collect();
        let materials: Vec<DrawLut> = visible
            .iter()
            .map(|id| DrawLut {
                material: id.0 % 4,
                ..DrawLut::zeroed()
            })
            .collect();
        let view = manager.lut_buffer_input_with::<DrawLut>(&visible, &materials)?;
        device.advance_frame();

        log::info!(
            "frame {}: {} element writes, reallocated: {}, draw LUT at {:?}[{}..{}]",
            report.frame,
            report.element_writes(),
            report.any_reallocated(),
            view.buffer,
            view.first_element,
            view.first_element + view.element_count
        );
    }

    let stats = manager.stats();
    for buffer in &stats.buffers {
        log::info!(
            "{} ({:?}): {} live in {} slots, {} rebuilds, {} element writes",
            buffer.name,
            buffer.namespace,
            buffer.live,
            buffer.capacity,
            buffer.stats.full_rebuilds,
            buffer.stats.element_writes
        );
    }
    for lut in &stats.luts {
        log::info!(
            "{}: {} writers, capacity {}, {} grows, {} shrinks",
            lut.name,
            lut.writers,
            lut.arena.capacity,
            lut.arena.grows,
            lut.arena.shrinks
        );
    }
    log::info!("Device: {:?}", device.stats());
    Ok(())
}
