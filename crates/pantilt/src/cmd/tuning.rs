use pantilt_control::{AxisConfig, Direction};

use crate::cmd::TuningArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_record, print_table, OutputFormat};

const HEADER: [&str; 9] = [
    "AXIS",
    "KP",
    "KI",
    "MAX_INTEGRAL",
    "DEADBAND_PX",
    "MAX_OUTPUT",
    "MIN",
    "MAX",
    "DIRECTION",
];

pub fn run(args: TuningArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.control.gimbal_config()?;

    match format {
        OutputFormat::Json => print_record(&config, format),
        OutputFormat::Table => {
            println!("mode: {}", config.mode.as_str());
            print_table(
                &HEADER,
                vec![row("pan", &config.pan), row("tilt", &config.tilt)],
            );
        }
        OutputFormat::Pretty => {
            println!("mode={}", config.mode.as_str());
            for (name, axis) in [("pan", &config.pan), ("tilt", &config.tilt)] {
                let line: Vec<String> = HEADER
                    .iter()
                    .zip(row(name, axis))
                    .map(|(key, value)| format!("{}={value}", key.to_ascii_lowercase()))
                    .collect();
                println!("{}", line.join(" "));
            }
        }
    }
    Ok(SUCCESS)
}

fn row(name: &str, axis: &AxisConfig) -> Vec<String> {
    vec![
        name.to_string(),
        axis.kp.to_string(),
        axis.ki.to_string(),
        axis.max_integral.to_string(),
        axis.deadband.to_string(),
        axis.max_output.to_string(),
        axis.min_position.to_string(),
        axis.max_position.to_string(),
        match axis.direction {
            Direction::Normal => "normal".to_string(),
            Direction::Inverted => "inverted".to_string(),
        },
    ]
}
