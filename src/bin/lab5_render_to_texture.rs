//! Lab 5: render to texture, volumetrics and post-processing.
//!
//! ```text
//! lab5-render-to-texture [--fighter PATH.stl] [--camera PATH.stl]
//! ```
//!
//! Left drag turns the main camera, right drag the security camera;
//! W/S/A/D/Q/E fly. G shows the sphere and post-effect controls.

use std::cell::RefCell;
use std::convert::Infallible;
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::bail;
use pico_args::Arguments;
use render_labs::lab5::{Lab5Controls, Lab5State};
use render_labs::{AppConfig, Frame, run_with_config};

fn path_arg(value: &OsStr) -> Result<PathBuf, Infallible> {
    Ok(PathBuf::from(value))
}

fn parse_args(args: Vec<OsString>, mut config: AppConfig) -> anyhow::Result<AppConfig> {
    let mut args = Arguments::from_vec(args);
    if let Some(path) = args.opt_value_from_os_str("--fighter", path_arg)? {
        config = config.fighter_model(Some(path));
    }
    if let Some(path) = args.opt_value_from_os_str("--camera", path_arg)? {
        config = config.camera_model(Some(path));
    }

    let rest = args.finish();
    if !rest.is_empty() {
        bail!("unknown arguments {rest:?}");
    }
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    let defaults = AppConfig::new().title("Lab 5: render to texture").size(1280, 720);
    let config = parse_args(std::env::args_os().skip(1).collect(), defaults)?;

    run_with_config(config, |ctx| {
        let lab5_config = ctx.config.lab5();
        let size = ctx.size();
        let lab = Rc::new(RefCell::new(Lab5State::new(ctx.device, size, &lab5_config)?));
        let controls = Lab5Controls::register(ctx.overlay, &lab.borrow().params);

        let on_exit = Rc::clone(&lab);
        ctx.on_exit(move |device| on_exit.borrow_mut().destroy(device));

        Ok(move |frame: &mut Frame| {
            let mut lab = lab.borrow_mut();
            controls.apply(frame.overlay, &mut lab.params);
            lab.update(frame.input, frame.dt);
            lab.render(frame.device, frame.size)?;
            Ok(())
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<OsString> {
        list.iter().map(OsString::from).collect()
    }

    #[test]
    fn model_paths_are_read() {
        let config = parse_args(
            args(&["--camera", "cam.stl", "--fighter", "ship.stl"]),
            AppConfig::new(),
        )
        .unwrap();
        assert_eq!(config.fighter_model, Some(PathBuf::from("ship.stl")));
        assert_eq!(config.camera_model, Some(PathBuf::from("cam.stl")));
    }

    #[test]
    fn no_arguments_keep_defaults() {
        let config = parse_args(Vec::new(), AppConfig::new()).unwrap();
        assert_eq!(config.fighter_model, None);
        assert_eq!(config.camera_model, None);
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_path_is_accepted() {
        use std::os::unix::ffi::OsStringExt;

        let path = OsString::from_vec(vec![0xff, b'.', b's', b't', b'l']);
        let config = parse_args(
            vec![OsString::from("--fighter"), path.clone()],
            AppConfig::new(),
        )
        .unwrap();
        assert_eq!(config.fighter_model, Some(PathBuf::from(path)));
    }

    #[test]
    fn unknown_argument_is_rejected() {
        assert!(parse_args(args(&["--fighter", "ship.stl", "--wat"]), AppConfig::new()).is_err());
    }

    #[test]
    fn missing_value_is_rejected() {
        assert!(parse_args(args(&["--camera"]), AppConfig::new()).is_err());
    }
}
