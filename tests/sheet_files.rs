#[path = "../src/sheet.rs"]
mod sheet;

use sheet::{read_table, write_table, Cell, SheetFormat};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn sample() -> Vec<Vec<Cell>> {
    vec![
        vec![Cell::text("Məktəb"), Cell::text("Say"), Cell::text("Qeyd")],
        vec![Cell::text("A & <B>"), Cell::Number(12.5), Cell::text("iki\nsətir")],
        vec![Cell::text("\"dırnaq\", vergül"), Cell::Empty],
    ]
}

#[test]
fn xlsx_and_csv_read_back_the_same_table() {
    let dir = temp_dir("infoline-sheet-files");
    for name in ["t.xlsx", "t.csv"] {
        let path = dir.join(name);
        write_table(&path, "Data", &sample()).expect("write");
        let table = read_table(&path).expect("read");
        assert_eq!(table.len(), 3, "{}", name);
        assert_eq!(table[0], vec!["Məktəb", "Say", "Qeyd"]);
        assert_eq!(table[1], vec!["A & <B>", "12.5", "iki\nsətir"]);
        // ragged rows are padded to the widest row
        assert_eq!(table[2], vec!["\"dırnaq\", vergül", "", ""]);
    }
}

#[test]
fn xlsx_is_a_zip_with_a_worksheet() {
    let dir = temp_dir("infoline-sheet-zip");
    let path = dir.join("nested").join("out.xlsx");
    write_table(&path, "Hesabat: 2024/25", &sample()).expect("write");
    let file = std::fs::File::open(&path).expect("open");
    let mut archive = zip::ZipArchive::new(file).expect("zip");
    assert!(archive.by_name("xl/worksheets/sheet1.xml").is_ok());
    assert!(archive.by_name("[Content_Types].xml").is_ok());
}

#[test]
fn formats_are_chosen_by_extension() {
    assert_eq!(SheetFormat::from_path(Path::new("a.XLSX")), Some(SheetFormat::Xlsx));
    assert_eq!(SheetFormat::from_path(Path::new("a.xls")), Some(SheetFormat::Xls));
    assert_eq!(SheetFormat::from_path(Path::new("a")), None);

    let dir = temp_dir("infoline-sheet-xls");
    let xls = dir.join("legacy.xls");
    std::fs::write(&xls, b"\xd0\xcf\x11\xe0").expect("write");
    assert!(read_table(&xls).is_err());
    assert!(write_table(&dir.join("x.xls"), "S", &sample()).is_err());
}

#[test]
fn csv_with_bom_is_read() {
    let dir = temp_dir("infoline-sheet-bom");
    let path = dir.join("bom.csv");
    std::fs::write(&path, "\u{feff}a,b\n1,2\n").expect("write");
    let table = read_table(&path).expect("read");
    assert_eq!(table[0], vec!["a", "b"]);
}

fn worksheet_only_xlsx(path: &Path, sheet_xml: &str) {
    use std::io::Write;
    let file = std::fs::File::create(path).expect("create");
    let mut zip = zip::ZipWriter::new(file);
    zip.start_file("xl/worksheets/sheet1.xml", zip::write::FileOptions::default())
        .expect("start entry");
    zip.write_all(sheet_xml.as_bytes()).expect("write entry");
    zip.finish().expect("finish");
}

#[test]
fn out_of_range_cell_references_are_errors() {
    let dir = temp_dir("infoline-sheet-bounds");

    let ok = dir.join("ok.xlsx");
    worksheet_only_xlsx(
        &ok,
        r#"<worksheet><sheetData><row r="1"><c r="C1" t="inlineStr"><is><t>x</t></is></c></row></sheetData></worksheet>"#,
    );
    assert_eq!(read_table(&ok).expect("read"), vec![vec!["", "", "x"]]);

    let wide = dir.join("wide.xlsx");
    worksheet_only_xlsx(
        &wide,
        r#"<worksheet><sheetData><row r="1"><c r="ZZZZZZZZZZZZZZZ1"><v>1</v></c></row></sheetData></worksheet>"#,
    );
    let err = read_table(&wide).expect_err("column past XFD");
    assert!(err.to_string().contains("XFD"), "{err}");

    let tall = dir.join("tall.xlsx");
    worksheet_only_xlsx(
        &tall,
        r#"<worksheet><sheetData><row r="99999999999"><c r="A99999999999"><v>1</v></c></row></sheetData></worksheet>"#,
    );
    assert!(read_table(&tall).is_err());
}
