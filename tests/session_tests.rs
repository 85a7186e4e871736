use float_cmp::assert_approx_eq;
use state_rates::rates::{firing_rates_multiple_sessions, summarize};
use state_rates::{
    import_neuroscope, load_session, load_session_with, load_sessions, plot_both_histograms,
    plot_raster, plot_scatter, read_session_list, read_spike_file, run_analysis, write_spike_file,
    AnalysisConfig, BrainState, CellGroup, CellType, HistogramParams, LoadOptions, RatesError,
    Region, SpikeTrain, NEURONS_FILE, SPIKES_FILE, STATES_FILE,
};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const SAMPLE_RATE: f32 = 1000.0;

fn train(id: u32, shank: u32, seconds: &[f64]) -> SpikeTrain {
    SpikeTrain {
        id,
        shank,
        samples: seconds.iter().map(|s| (s * SAMPLE_RATE as f64) as u64).collect(),
    }
}

// Wake covers 0-10 s and 20-30 s, sws 10-20 s, no REM
fn write_session(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    write_spike_file(
        &dir.join(SPIKES_FILE),
        SAMPLE_RATE,
        &[
            train(0, 1, &[1.0, 2.0, 12.0, 25.0]),
            train(1, 1, &[5.0, 15.0, 16.0]),
            train(2, 2, &[3.0, 11.0]),
            train(3, 2, &[]),
            train(9, 3, &[1.0]),
        ],
    )
    .unwrap();
    fs::write(
        dir.join(NEURONS_FILE),
        "id,shank,type,region\n0,1,Pyr,Hpc\n1,1,Int,Hpc\n2,2,Pyr,BLA\n3,2,Unk,BLA\n4,3,Int,BLA\n",
    )
    .unwrap();
    fs::write(
        dir.join(STATES_FILE),
        "state,start,end\nwake,0,10\nsws,10,20\nwake,20,30\nquiet,30,40\n",
    )
    .unwrap();
}

#[test]
fn spike_file_round_trip_preserves_trains() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join(SPIKES_FILE);
    let trains = vec![train(4, 2, &[0.5, 1.5]), train(7, 3, &[])];
    write_spike_file(&path, SAMPLE_RATE, &trains).unwrap();

    let spike_file = read_spike_file(&path).unwrap();
    assert_eq!(spike_file.sample_rate, SAMPLE_RATE);
    assert_eq!(spike_file.version.major, 1);
    assert_eq!(spike_file.trains, trains);
}

#[test]
fn truncated_spike_file_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join(SPIKES_FILE);
    write_spike_file(&path, SAMPLE_RATE, &[train(0, 1, &[1.0, 2.0, 3.0])]).unwrap();

    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();
    let err = read_spike_file(&path).unwrap_err();
    assert!(matches!(err, RatesError::FileSizeError), "got {err}");

    let mut padded = bytes.clone();
    padded.extend_from_slice(&[0, 0]);
    fs::write(&path, padded).unwrap();
    assert!(matches!(read_spike_file(&path), Err(RatesError::FileSizeError)));
}

#[test]
fn session_loads_metadata_and_states() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("Rat00-20000101");
    write_session(&dir);

    let session = load_session(&dir).unwrap();
    assert_eq!(session.name, "Rat00-20000101");
    assert_eq!(session.sample_rate, SAMPLE_RATE);
    // Train 9 has no metadata and is dropped; neuron 4 has no train and is silent
    assert_eq!(session.num_neurons(), 5);
    assert_eq!(session.neurons[4].num_spikes(), 0);
    assert_eq!(session.neurons[2].cell_type, CellType::Pyramidal);
    assert_eq!(session.neurons[2].region, Region::Bla);

    let wake = session.state(BrainState::Wake).unwrap();
    assert_eq!(wake.len(), 2);
    assert_eq!(wake.tot_length(), 20.0);
    assert!(session.state(BrainState::Rem).is_none());
    assert_eq!(session.duration(), 30.0);
}

#[test]
fn missing_states_table_is_reported() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("s");
    write_session(&dir);
    fs::remove_file(dir.join(STATES_FILE)).unwrap();

    let err = load_session(&dir).unwrap_err();
    assert!(err.to_string().contains(STATES_FILE), "got {err}");
}

#[test]
fn bad_cell_type_is_reported() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("s");
    write_session(&dir);
    fs::write(dir.join(NEURONS_FILE), "id,shank,type,region\n0,1,Glia,Hpc\n").unwrap();

    let err = load_session(&dir).unwrap_err();
    assert!(err.to_string().contains("Glia"), "got {err}");
}

#[test]
fn rates_across_sessions() {
    let tmp = TempDir::new().unwrap();
    let first = tmp.path().join("a");
    let second = tmp.path().join("b");
    write_session(&first);
    write_session(&second);

    let sessions = load_sessions(&[&first, &second]).unwrap();
    let (wake, rem) = firing_rates_multiple_sessions(&sessions, [BrainState::Wake, BrainState::Rem], &Region::Hpc);

    assert_eq!(wake.sessions.len(), 2);
    assert_eq!(wake.sessions[0].session, "a");

    let pyramidal = wake.flatten(CellGroup::Pyramidal);
    assert_eq!(pyramidal.len(), 2);
    for rate in pyramidal.iter() {
        assert_approx_eq!(f64, *rate, 3.0 / 20.0);
    }
    assert_approx_eq!(f64, wake.flatten(CellGroup::Interneuron)[0], 0.05);
    // The unclassified BLA unit is counted even though the region is Hpc
    assert_eq!(wake.flatten(CellGroup::Other).len(), 2);
    assert_eq!(wake.flatten(CellGroup::Other)[0], 0.0);

    // No REM scored: every rate is undefined, but every neuron is present
    assert_eq!(rem.num_neurons(), wake.num_neurons());
    assert!(rem.flatten_all().get(CellGroup::Pyramidal).iter().all(|r| r.is_nan()));

    let summaries = summarize(&rem);
    assert!(summaries.iter().all(|s| s.defined == 0));
}

#[test]
fn bla_groups_use_bla_units() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("a");
    write_session(&dir);

    let sessions = load_sessions(&[&dir]).unwrap();
    let (wake, sws) = firing_rates_multiple_sessions(&sessions, [BrainState::Wake, BrainState::Sws], &Region::Bla);
    assert_approx_eq!(f64, wake.flatten(CellGroup::Pyramidal)[0], 0.05);
    assert_approx_eq!(f64, sws.flatten(CellGroup::Pyramidal)[0], 0.1);
    // Unit 4 has metadata but no spikes
    assert_eq!(sws.flatten(CellGroup::Interneuron)[0], 0.0);
}

#[test]
fn session_list_skips_comments_and_resolves_relative_paths() {
    let tmp = TempDir::new().unwrap();
    let list = tmp.path().join("sessions.txt");
    fs::write(&list, "# rats\nRat08-20130708\n\n/abs/Rat09-20140324\n").unwrap();

    let paths = read_session_list(&list).unwrap();
    assert_eq!(paths.len(), 2);
    assert_eq!(paths[0], tmp.path().join("Rat08-20130708"));
    assert_eq!(paths[1], Path::new("/abs/Rat09-20140324"));
}

#[test]
fn neuroscope_session_loads_without_spike_file() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("Rat01-20200101");
    fs::create_dir_all(&dir).unwrap();
    // Shank 1: clusters 0 and 1 are noise and MUA, 2 and 5 are units
    fs::write(dir.join("Rat01-20200101.res.1"), "100\n200\n300\n400\n500\n").unwrap();
    fs::write(dir.join("Rat01-20200101.clu.1"), "4\n0\n2\n5\n1\n2\n").unwrap();
    fs::write(dir.join("Rat01-20200101.res.2"), "1000\n").unwrap();
    fs::write(dir.join("Rat01-20200101.clu.2"), "1\n3\n").unwrap();
    fs::write(
        dir.join(NEURONS_FILE),
        "id,type,region\n0,Pyr,Hpc\n1,Int,Hpc\n2,Unk,BLA\n",
    )
    .unwrap();
    fs::write(dir.join(STATES_FILE), "state,start,end\nRem,0,1\n").unwrap();

    let session = load_session_with(&dir, &LoadOptions { sample_rate: 100.0 }).unwrap();
    assert_eq!(session.num_neurons(), 3);
    assert_eq!(session.neurons[0].spike_times.to_vec(), vec![2.0, 5.0]);
    assert_eq!(session.neurons[1].spike_times.to_vec(), vec![3.0]);
    assert_eq!(session.neurons[2].shank, 2);
    assert_eq!(session.neurons[2].spike_times.to_vec(), vec![10.0]);
}

#[test]
fn neuroscope_import_writes_spike_file_and_template() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::write(dir.join("x.res.1"), "10\n20\n").unwrap();
    fs::write(dir.join("x.clu.1"), "3\n2\n3\n").unwrap();

    let path = import_neuroscope(dir, 20_000.0).unwrap();
    let spike_file = read_spike_file(&path).unwrap();
    assert_eq!(spike_file.trains.len(), 2);
    assert_eq!(spike_file.trains[1].samples, vec![20]);

    let template = fs::read_to_string(dir.join(NEURONS_FILE)).unwrap();
    assert!(template.starts_with("id,shank,type,region"));
    assert_eq!(template.lines().count(), 3);
}

#[test]
fn config_resolves_paths_against_its_directory() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("analysis.toml");
    fs::write(
        &config_path,
        "sessions_file = \"sessions.txt\"\noutput_dir = \"plots\"\nsessions = [\"extra\"]\n",
    )
    .unwrap();
    fs::write(tmp.path().join("sessions.txt"), "a\nb\n").unwrap();

    let config = AnalysisConfig::load(&config_path).unwrap();
    assert_eq!(config.output_dir, tmp.path().join("plots"));
    let paths = config.session_paths().unwrap();
    assert_eq!(
        paths,
        vec![tmp.path().join("extra"), tmp.path().join("a"), tmp.path().join("b")]
    );
}

fn assert_png_written(path: &Path) {
    let size = fs::metadata(path).unwrap().len();
    assert!(size > 0, "{} is empty", path.display());
}

#[test]
fn scatter_and_histograms_are_written() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("a");
    write_session(&dir);
    let sessions = load_sessions(&[&dir]).unwrap();
    let out_dir = tmp.path().join("plots");
    let states = [BrainState::Wake, BrainState::Sws];

    let scatter = plot_scatter(&sessions, states, &Region::Hpc, &out_dir).unwrap();
    assert_eq!(scatter, out_dir.join("scatter_Hpc_wake_vs_sws.png"));
    assert_png_written(&scatter);

    let histograms =
        plot_both_histograms(&sessions, states, &Region::Hpc, &HistogramParams::default(), &out_dir).unwrap();
    assert_eq!(histograms[0], out_dir.join("histogram_Hpc_wake.png"));
    assert_eq!(histograms[1], out_dir.join("histogram_Hpc_sws.png"));
    for path in &histograms {
        assert_png_written(path);
    }
}

#[test]
fn raster_shades_scored_state_only() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("a");
    write_session(&dir);
    let session = load_session(&dir).unwrap();

    let out = tmp.path().join("raster.png");
    plot_raster(&session, 0.0, 30.0, Some(BrainState::Sws), &out).unwrap();
    assert_png_written(&out);

    let unscored = tmp.path().join("rem.png");
    let err = plot_raster(&session, 0.0, 30.0, Some(BrainState::Rem), &unscored).unwrap_err();
    assert!(err.to_string().contains("Rem"), "got {err}");
    assert!(!unscored.exists());
}

#[test]
fn analysis_writes_three_plots_per_comparison() {
    let tmp = TempDir::new().unwrap();
    write_session(&tmp.path().join("a"));
    write_session(&tmp.path().join("b"));
    let config_path = tmp.path().join("analysis.toml");
    fs::write(
        &config_path,
        r#"
            sessions = ["a", "b"]
            output_dir = "out"

            [[comparison]]
            region = "Hpc"
            states = ["wake", "sws"]

            [[comparison]]
            region = "BLA"
            states = ["wake", "Rem"]

            [histogram]
            bin_edges = 20
        "#,
    )
    .unwrap();

    let config = AnalysisConfig::load(&config_path).unwrap();
    let written = run_analysis(&config).unwrap();
    assert_eq!(written.len(), 6);
    for path in &written {
        assert!(path.starts_with(tmp.path().join("out")));
        assert_png_written(path);
    }
}

#[test]
fn cli_reports_errors_on_stderr_with_logging_off() {
    let tmp = TempDir::new().unwrap();
    let output = std::process::Command::new(env!("CARGO_BIN_EXE_state_rates"))
        .args(["summary", "--sessions"])
        .arg(tmp.path().join("missing.txt"))
        .env("RUST_LOG", "off")
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error:"), "got {stderr}");
    assert!(stderr.contains("missing.txt"), "got {stderr}");
}
