use argh::FromArgs;
use glam::{DMat4, DQuat, DVec3};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use kornia_registration::{PointCloud, RobustIcp, RobustIcpParams};

#[derive(FromArgs)]
/// Register a synthetic point cloud onto a moved and corrupted copy of itself
struct Args {
    /// number of reference points
    #[argh(option, short = 'n', default = "2000")]
    num_points: usize,

    /// rotation about the z axis in degrees
    #[argh(option, default = "5.0")]
    angle_deg: f64,

    /// translation along x, y, z
    #[argh(option, default = "0.2")]
    shift: f64,

    /// fraction of source points replaced by far outliers
    #[argh(option, default = "0.1")]
    outlier_ratio: f64,

    /// seed for the synthetic data and the registration
    #[argh(option, default = "0")]
    seed: u64,

    /// path to a JSON file with the registration parameters
    #[argh(option)]
    params_path: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let params = match &args.params_path {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => RobustIcpParams::default(),
    };
    log::info!("parameters: {:?}", params);

    let mut rng = StdRng::seed_from_u64(args.seed);

    // reference: points sampled on the floor and two walls of a 10x10x3 room
    let reference_points = (0..args.num_points)
        .map(|i| {
            let (u, v) = (rng.random_range(0.0..10.0), rng.random_range(0.0..3.0));
            match i % 3 {
                0 => [u, rng.random_range(0.0..10.0), 0.0],
                1 => [u, 0.0, v],
                _ => [0.0, u, v],
            }
        })
        .collect::<Vec<[f64; 3]>>();

    let motion = DMat4::from_rotation_translation(
        DQuat::from_rotation_z(args.angle_deg.to_radians()),
        DVec3::splat(args.shift),
    );

    let source_points = reference_points
        .iter()
        .map(|p| {
            if rng.random::<f64>() < args.outlier_ratio {
                [
                    rng.random_range(-50.0..50.0),
                    rng.random_range(-50.0..50.0),
                    rng.random_range(20.0..50.0),
                ]
            } else {
                motion.transform_point3(DVec3::from_array(*p)).to_array()
            }
        })
        .collect::<Vec<_>>();

    let reference = PointCloud::from_vec(reference_points)?;
    let mut source = PointCloud::from_vec(source_points)?;
    println!("Reference cloud: #{} points", reference.len());
    println!("Source cloud: #{} points", source.len());

    // create a cancel token to stop the registration
    let cancel_token = Arc::new(AtomicBool::new(false));

    ctrlc::set_handler({
        let cancel_token = cancel_token.clone();
        move || {
            println!("Received Ctrl-C signal. Sending cancel signal !!");
            cancel_token.store(true, Ordering::SeqCst);
        }
    })?;

    let icp = RobustIcp::new(&reference, params)?.with_cancel_token(cancel_token);

    let mut dst_t_src = DMat4::IDENTITY;
    let result = icp.register(&mut source, &mut dst_t_src, &mut rng)?;
    println!("ICP registration result: {:?}", result);

    let error = dst_t_src * motion;
    let (_, rotation, translation) = error.to_scale_rotation_translation();
    println!(
        "Residual motion: translation {:.6}, rotation {:.6} rad",
        translation.length(),
        rotation.angle_between(DQuat::IDENTITY)
    );

    Ok(())
}
