// PDF Report Generator
//
// Plain text PDF 1.4: one built-in font (Helvetica), A4 pages, lines wrapped
// and paginated here. Enough for an archived copy of the report.
//
// Text is written as hex strings in WinAnsiEncoding, which covers Latin-1 and
// the usual typographic punctuation. Characters outside it are printed as
// their code point (`<U+65E5>`) so nothing is silently lost. Targets are
// already ASCII: hostnames are stored in their punycode form.

use crate::findings::Severity;
use crate::output::Report;
use crate::Result;

const PAGE_WIDTH: u32 = 595;
const PAGE_HEIGHT: u32 = 842;
const MARGIN: u32 = 50;
const FONT_SIZE: u32 = 10;
const LEADING: u32 = 14;
const WRAP_COLUMNS: usize = 95;

fn lines_per_page() -> usize {
    ((PAGE_HEIGHT - 2 * MARGIN) / LEADING) as usize
}

/// Report text, one entry per output line before wrapping
fn report_lines(report: &Report) -> Vec<String> {
    let summary = &report.summary;
    let mut lines = vec![
        "Vulnerability Scan Report".to_string(),
        String::new(),
        format!("Scan:     {}", report.scan_id),
        format!("Target:   {}", report.target),
        format!("Mode:     {}", report.mode),
        format!("Duration: {}", summary.duration),
        String::new(),
        format!("Findings: {}", summary.total),
    ];
    for severity in Severity::ALL {
        lines.push(format!("  {:<9} {}", severity.as_str(), summary.count(severity)));
    }

    for (i, finding) in report.vulnerabilities.iter().enumerate() {
        lines.push(String::new());
        lines.push(format!(
            "{}. [{}] {}",
            i + 1,
            finding.severity.as_str().to_uppercase(),
            finding.name
        ));
        lines.push(format!("   Path: {}", finding.path));
        lines.push(format!("   {}", finding.description));
        lines.push(format!("   Impact: {}", finding.impact));
        lines.push(format!("   Remediation: {}", finding.remediation));
        if let Some(evidence) = &finding.evidence {
            lines.push(format!("   Evidence: {}", evidence));
        }
        for reference in &finding.references {
            lines.push(format!("   See: {}", reference));
        }
    }

    lines
}

/// Break a line into chunks of at most `width` characters, on spaces when possible
fn wrap(line: &str, width: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();

    for word in line.split(' ') {
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > width && !current.is_empty() {
            out.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);

        while current.chars().count() > width {
            let head: String = current.chars().take(width).collect();
            let tail: String = current.chars().skip(width).collect();
            out.push(head);
            current = tail;
        }
    }
    out.push(current);
    out
}

/// WinAnsiEncoding byte for `c`, if the built-in font can show it
fn win_ansi(c: char) -> Option<u8> {
    let byte = match c {
        '\t' => b' ',
        ' '..='~' | '\u{a0}'..='\u{ff}' => c as u32 as u8,
        '\u{20ac}' => 0x80,
        '\u{201a}' => 0x82,
        '\u{0192}' => 0x83,
        '\u{201e}' => 0x84,
        '\u{2026}' => 0x85,
        '\u{2020}' => 0x86,
        '\u{2021}' => 0x87,
        '\u{02c6}' => 0x88,
        '\u{2030}' => 0x89,
        '\u{0160}' => 0x8a,
        '\u{2039}' => 0x8b,
        '\u{0152}' => 0x8c,
        '\u{017d}' => 0x8e,
        '\u{2018}' => 0x91,
        '\u{2019}' => 0x92,
        '\u{201c}' => 0x93,
        '\u{201d}' => 0x94,
        '\u{2022}' => 0x95,
        '\u{2013}' => 0x96,
        '\u{2014}' => 0x97,
        '\u{02dc}' => 0x98,
        '\u{2122}' => 0x99,
        '\u{0161}' => 0x9a,
        '\u{203a}' => 0x9b,
        '\u{0153}' => 0x9c,
        '\u{017e}' => 0x9e,
        '\u{0178}' => 0x9f,
        _ => return None,
    };
    Some(byte)
}

/// Hex string body for a line of text
fn encode(text: &str) -> String {
    let mut bytes = Vec::with_capacity(text.len());
    for c in text.chars() {
        match win_ansi(c) {
            Some(byte) => bytes.push(byte),
            None => bytes.extend(format!("<U+{:04X}>", c as u32).bytes()),
        }
    }
    hex::encode_upper(bytes)
}

fn page_stream(lines: &[String]) -> String {
    let mut stream = format!(
        "BT\n/F1 {} Tf\n{} TL\n{} {} Td\n",
        FONT_SIZE,
        LEADING,
        MARGIN,
        PAGE_HEIGHT - MARGIN
    );
    for line in lines {
        stream.push_str(&format!("<{}> Tj T*\n", encode(line)));
    }
    stream.push_str("ET\n");
    stream
}

/// Generate a PDF document
pub fn generate_pdf(report: &Report) -> Result<Vec<u8>> {
    let lines: Vec<String> = report_lines(report)
        .iter()
        .flat_map(|line| wrap(line, WRAP_COLUMNS))
        .collect();
    let pages: Vec<&[String]> = lines.chunks(lines_per_page()).collect();

    // Object layout: 1 catalog, 2 page tree, 3 font, then a page and its
    // content stream per page.
    let page_ids: Vec<usize> = (0..pages.len()).map(|i| 4 + 2 * i).collect();
    let mut objects: Vec<String> = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            page_ids
                .iter()
                .map(|id| format!("{} 0 R", id))
                .collect::<Vec<_>>()
                .join(" "),
            pages.len()
        ),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
            .to_string(),
    ];

    for (page, id) in pages.iter().zip(&page_ids) {
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} {}] /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
            PAGE_WIDTH,
            PAGE_HEIGHT,
            id + 1
        ));
        let stream = page_stream(page);
        objects.push(format!(
            "<< /Length {} >>\nstream\n{}endstream",
            stream.len(),
            stream
        ));
    }

    let mut pdf = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, object) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.push_str(&format!("{} 0 obj\n{}\nendobj\n", i + 1, object));
    }

    let xref_offset = pdf.len();
    pdf.push_str(&format!("xref\n0 {}\n", objects.len() + 1));
    pdf.push_str("0000000000 65535 f \n");
    for offset in offsets {
        pdf.push_str(&format!("{:010} 00000 n \n", offset));
    }
    pdf.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref_offset
    ));

    Ok(pdf.into_bytes())
}
