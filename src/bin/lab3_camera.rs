//! Lab 3: free-fly camera, a drivable car and a roundabout.
//!
//! W/S fly, left drag turns the camera, arrow keys drive the car. G shows
//! the projection controls.

use render_labs::lab3::{Lab3Scene, Lab3State, PerspectiveControls};
use render_labs::{AppConfig, Frame, FramebufferPool, Sequencer, run_with_config};

fn main() -> anyhow::Result<()> {
    let state = Lab3State::new();
    let config = AppConfig::new()
        .title("Lab 3: camera")
        .size(state.params.width, state.params.height);

    run_with_config(config, move |ctx| {
        let scene = Lab3Scene::new(ctx.device)?;
        let mut state = state;
        let controls = PerspectiveControls::register(ctx.overlay, &state.params);
        let (width, height) = ctx.size();
        controls.write_size(ctx.overlay, width, height);
        state.params = controls.read(ctx.overlay);

        let mut sequencer = Sequencer::new();
        let mut pool = FramebufferPool::new();

        Ok(move |frame: &mut Frame| {
            if let Some((width, height)) = frame.window_resized() {
                controls.write_size(frame.overlay, width, height);
                state.params = controls.read(frame.overlay);
            }
            if frame.overlay_changed {
                let params = controls.read(frame.overlay);
                if (params.width, params.height) != (state.params.width, state.params.height) {
                    frame.request_window_size(params.width, params.height);
                }
                state.params = params;
            }

            state.update(frame.input, frame.dt);
            let passes = state.passes(&scene);
            sequencer.execute(frame.device, &mut pool, &passes, frame.size)?;
            Ok(())
        })
    })
}
