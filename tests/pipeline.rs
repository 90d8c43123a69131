#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::collections::HashMap;
use std::sync::Arc;

use scpi_console::controls::{controls_for, Control};
use scpi_console::descriptor::{load_table, DescriptorCache, Direction};
use scpi_console::history::HistoryRecorder;
use scpi_console::instrument::{Identity, Instrument, LoopbackTransport, IDN_QUERY};
use scpi_console::render::{render, ExecutionRequest, RenderError};
use scpi_console::script::parse_script;
use scpi_console::session::Session;
use scpi_console::workbook::Workbook;

const WORKBOOK: &str = r#"{
  "sheets": [
    {
      "name": "SDG1032X",
      "headers": ["Name", "GET/SET", "CMD", "Parameters", "Notes"],
      "rows": [
        ["Waveform", "SET", "{CH}:BSWV WVTP,{WAVE}", "CH:C1;C2 | WAVE:SINE;SQUARE;RAMP", ""],
        ["Frequency", "SET", "{CH}:BSWV FRQ,{FREQ}", "CH:C1;C2 | FREQ", "Hz"],
        ["Amplitude", "SET", "{CH}:BSWV AMP,{AMP}", "CH:C1;C2 | AMP:V.3f", "Vpp"],
        ["Broken", "SET", "{CH}:OUTP {STATE}", "CH:C1;C2", ""],
        ["Output", "SET", "{CH}:OUTP {STATE}", "CH:C1;C2 | STATE:ON;OFF", ""],
        ["Identify", "GET", "*IDN?", null, ""]
      ]
    },
    {
      "name": "DMM6500",
      "headers": ["name", "get/set", "cmd", "parameter"],
      "rows": [
        ["Range", "SET", "SENS:VOLT:RANG {R}", "R:AUTO;500E-3;5"],
        ["Read", "GET", "READ?", ""]
      ]
    }
  ]
}"#;

fn workbook() -> Workbook {
    Workbook::from_json_str(WORKBOOK).unwrap()
}

fn values(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

#[test]
fn workbook_to_wire_string() {
    let table = load_table(&workbook(), "sdg1032x").unwrap().unwrap();
    assert_eq!(table.len(), 5);
    assert_eq!(table.warnings().len(), 1);
    assert_eq!(table.warnings()[0].row, Some(5));

    let freq = table.find("Frequency").unwrap();
    let layout = controls_for(freq);
    assert!(matches!(&layout.controls[0], Control::Selector { options, .. } if options == &["C1", "C2"]));
    assert!(matches!(&layout.controls[1], Control::TextEntry { hint, .. } if hint == "FREQ"));

    let out = render(freq, &values(&[("CH", "C1"), ("FREQ", "1000")])).unwrap();
    assert_eq!(out.text, "C1:BSWV FRQ,1000");

    let amp = table.find("amplitude").unwrap();
    let out = render(amp, &values(&[("CH", "C2"), ("AMP", "1.23456")])).unwrap();
    assert_eq!(out.text, "C2:BSWV AMP,1.235");

    let idn = table.find("Identify").unwrap();
    assert!(controls_for(idn).fires_immediately);
    assert_eq!(render(idn, &HashMap::new()).unwrap().text, "*IDN?");
}

#[test]
fn enumerated_values_are_checked() {
    let table = load_table(&workbook(), "DMM6500").unwrap().unwrap();
    let range = table.find("Range").unwrap();
    assert_eq!(render(range, &values(&[("R", "5")])).unwrap().text, "SENS:VOLT:RANG 5");
    assert!(matches!(
        render(range, &values(&[("R", "6")])),
        Err(RenderError::InvalidEnumValue { .. })
    ));
}

#[test]
fn session_history_exports_a_replayable_script() {
    let transport = LoopbackTransport::new();
    transport.respond(IDN_QUERY, "Siglent Technologies,SDG1032X,SDG1XCA1234567,1.01.01.33R1");
    transport.respond("READ?", "+1.00023E+00\n");

    let history = Arc::new(HistoryRecorder::new());
    let session = Session::new(Arc::new(workbook()), Box::new(transport))
        .with_history(Arc::clone(&history));

    let awg = session.identify("USB0::0xF4EC::0x1103::SDG1XCA1234567::INSTR").unwrap();
    session.set_alias("awg", &awg.identity).unwrap();
    session.register(Instrument::new("TCPIP0::192.168.1.20::inst0::INSTR", Identity::new("Keithley", "DMM6500", "04512345")));
    session.set_alias("dmm", &Identity::new("KEITHLEY", "dmm6500", "04512345")).unwrap();

    let catalog = session.commands_for("AWG").unwrap();
    assert!(catalog.found);
    assert_eq!(catalog.model, "SDG1032X");
    assert_eq!(catalog.warnings.len(), 1);

    session
        .execute("awg", "Waveform", &values(&[("CH", "C1"), ("WAVE", "SQUARE")]))
        .unwrap();
    session
        .execute_request("awg", &ExecutionRequest::new("Output").with("CH", "C1").with("STATE", "ON"))
        .unwrap();
    let read = session.execute("dmm", "Read", &HashMap::new()).unwrap();
    assert_eq!(read.response.as_deref(), Some("+1.00023E+00"));
    session.execute_adhoc("awg", r#"C1:BSWV "odd\text""#).unwrap();

    // A rejected request leaves no trace.
    assert!(session.execute("awg", "Output", &values(&[("CH", "C3"), ("STATE", "ON")])).is_err());

    let entries = history.snapshot();
    assert_eq!(entries.len(), 4);

    let script = history.export();
    let steps = parse_script(&script).unwrap();
    assert_eq!(steps.len(), entries.len());
    for (step, entry) in steps.iter().zip(&entries) {
        assert_eq!(step.text, entry.sent_text);
        assert_eq!(step.resource, entry.resource);
        assert_eq!(step.direction, entry.direction);
    }
    assert_eq!(steps[2].direction, Direction::Get);
    assert_eq!(script.matches("open_resource").count(), 2);

    history.clear();
    assert!(parse_script(&history.export()).unwrap().is_empty());
}

#[test]
fn concurrent_loads_share_one_table() {
    let wb = Arc::new(workbook());
    let cache = Arc::new(DescriptorCache::new());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let wb = Arc::clone(&wb);
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || cache.get_or_load(wb.as_ref(), "SDG1032X").unwrap().unwrap())
        })
        .collect();
    let tables: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for t in &tables[1..] {
        assert!(Arc::ptr_eq(&tables[0], t));
    }
    assert_eq!(cache.len(), 1);
}
