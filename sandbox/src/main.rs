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

// ArchiComm governor sandbox
// Drives a few synthetic surfaces, slows one down and floods a store with updates.

use std::thread;
use std::time::Duration;

use anyhow::Result;
use archicomm_sdk::prelude::*;

/// A surface whose frame cost grows with the element count and shrinks with
/// the quality level.
struct SyntheticSurface {
    cost_per_element: Duration,
    memory_mb: f64,
}

impl SyntheticSurface {
    fn new(cost_per_element_us: u64, memory_mb: f64) -> Self {
        Self {
            cost_per_element: Duration::from_micros(cost_per_element_us),
            memory_mb,
        }
    }
}

impl RenderSurface for SyntheticSurface {
    fn render(
        &mut self,
        request: &FrameRequest,
        quality: QualityLevel,
    ) -> Result<FrameOutput, SurfaceError> {
        let drawn = (request.complexity as f32 * quality.value()) as u32;
        thread::sleep(self.cost_per_element * drawn);
        Ok(FrameOutput {
            memory_mb: self.memory_mb,
            complexity: drawn,
        })
    }
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = match std::env::args().nth(1) {
        Some(path) => GovernorConfig::from_file(path)?,
        None => GovernorConfig::default(),
    };
    let mut governor = Governor::new(config);

    governor.on_quality_changed(|level| log::info!("Sandbox: quality is now {level}"));
    governor.on_breaker_event("cart-store", |event| {
        log::warn!(
            "Sandbox: cart-store breaker {:?} after {} updates",
            event.kind,
            event.snapshot.window_updates
        );
    });

    let targets: Vec<RenderTargetId> = vec!["main-canvas".into(), "minimap".into(), "export-svg".into()];
    governor.register_target(targets[0].clone(), SyntheticSurface::new(40, 60.0), TargetKind::Canvas2d);
    governor.register_target(targets[1].clone(), SyntheticSurface::new(5, 12.0), TargetKind::WebGl);
    governor.register_target(targets[2].clone(), SyntheticSurface::new(20, 70.0), TargetKind::Svg);
    governor.set_budget(
        targets[2].clone(),
        BudgetOverride::default().max_render_time_ms(50.0),
    );

    for frame in 0..180u64 {
        for target in &targets {
            governor.render(target, FrameRequest::new(frame, 400 + (frame as u32 % 60) * 10));
        }

        // A store that reacts to its own updates.
        if (60..90).contains(&frame) {
            for _ in 0..3 {
                if governor.should_allow_update("cart-store") {
                    governor.record_update("cart-store", UpdateMeta::action("add-item"));
                }
            }
        }

        governor.pump();
        thread::sleep(Duration::from_millis(16));
    }

    for recommendation in governor.recommendations() {
        log::info!("Sandbox: {recommendation}");
    }
    println!("{}", governor.export_performance_data().to_json()?);

    governor.shutdown();
    Ok(())
}
