//! Fixed A4 layout of a payment receipt.

use chrono::{DateTime, Utc};
use printpdf::{
    BuiltinFont, Color, IndirectFontRef, Line, Mm, PdfDocument, PdfLayerReference, Point, Rgb,
};

use crate::config::Branding;
use crate::models::money;

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 18.0;
// Helvetica averages roughly half an em per glyph; 1pt = 0.3528mm.
const GLYPH_MM_PER_PT: f32 = 0.5 * 0.3528;

const INK: (u8, u8, u8) = (0x2c, 0x3e, 0x50);
const MUTED: (u8, u8, u8) = (0x7f, 0x8c, 0x8d);
const FAINT: (u8, u8, u8) = (0x95, 0xa5, 0xa6);
const ACCENT: (u8, u8, u8) = (0x34, 0x98, 0xdb);
const SUCCESS: (u8, u8, u8) = (0x27, 0xae, 0x60);

pub const DEFAULT_DESCRIPTION: &str = "Course Fee Payment";

#[derive(Debug, Clone)]
pub struct ReceiptSheet {
    pub receipt_id: String,
    pub issued_at: DateTime<Utc>,
    pub student_id: String,
    pub student_name: String,
    pub student_email: String,
    pub amount: f64,
    pub description: String,
    pub branding: Branding,
}

fn color((r, g, b): (u8, u8, u8)) -> Color {
    Color::Rgb(Rgb::new(
        f32::from(r) / 255.0,
        f32::from(g) / 255.0,
        f32::from(b) / 255.0,
        None,
    ))
}

fn point(x: f32, y: f32) -> (Point, bool) {
    (Point::new(Mm(x), Mm(y)), false)
}

/// Writes top to bottom, keeping track of the baseline.
struct Pen {
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    y: f32,
}

impl Pen {
    fn down(&mut self, mm: f32) {
        self.y -= mm;
    }

    fn text(&mut self, text: &str, size: f32, bold: bool, tint: (u8, u8, u8), x: f32) {
        let font = if bold { &self.bold } else { &self.regular };
        self.layer.set_fill_color(color(tint));
        self.layer.use_text(text, size, Mm(x), Mm(self.y), font);
    }

    fn centered(&mut self, text: &str, size: f32, bold: bool, tint: (u8, u8, u8)) {
        let width = text.chars().count() as f32 * size * GLYPH_MM_PER_PT;
        let x = ((PAGE_WIDTH - width) / 2.0).max(MARGIN);
        self.text(text, size, bold, tint, x);
    }

    fn line(&mut self, text: &str, size: f32, bold: bool) {
        self.text(text, size, bold, INK, MARGIN);
        self.down(size * 0.55);
    }

    fn field(&mut self, label: &str, value: &str) {
        self.text(label, 13.0, true, INK, MARGIN);
        let offset = label.chars().count() as f32 * 13.0 * GLYPH_MM_PER_PT + 4.0;
        self.text(value, 13.0, false, INK, MARGIN + offset);
        self.down(7.5);
    }

    fn rule(&mut self, tint: (u8, u8, u8), thickness: f32) {
        self.layer.set_outline_color(color(tint));
        self.layer.set_outline_thickness(thickness);
        self.layer.add_line(Line {
            points: vec![point(MARGIN, self.y), point(PAGE_WIDTH - MARGIN, self.y)],
            is_closed: false,
        });
    }

    fn stamp(&mut self, headline: &str, caption: &str) {
        let (width, height) = (80.0, 30.0);
        let left = (PAGE_WIDTH - width) / 2.0;
        let top = self.y;
        self.layer.set_outline_color(color(SUCCESS));
        self.layer.set_outline_thickness(2.5);
        self.layer.add_line(Line {
            points: vec![
                point(left, top),
                point(left + width, top),
                point(left + width, top - height),
                point(left, top - height),
            ],
            is_closed: true,
        });
        self.down(13.0);
        self.centered(headline, 17.0, true, SUCCESS);
        self.down(9.0);
        self.centered(caption, 11.0, false, MUTED);
        self.y = top - height;
    }
}

pub fn render(sheet: &ReceiptSheet) -> Result<Vec<u8>, printpdf::Error> {
    let (doc, page, layer) = PdfDocument::new(
        format!("Payment Receipt {}", sheet.receipt_id),
        Mm(PAGE_WIDTH),
        Mm(PAGE_HEIGHT),
        "Receipt",
    );
    let regular = doc.add_builtin_font(BuiltinFont::Helvetica)?;
    let bold = doc.add_builtin_font(BuiltinFont::HelveticaBold)?;
    let mut pen = Pen {
        layer: doc.get_page(page).get_layer(layer),
        regular,
        bold,
        y: PAGE_HEIGHT - 28.0,
    };

    pen.centered(&sheet.branding.name.to_uppercase(), 25.0, true, INK);
    pen.down(11.0);
    pen.centered("Payment Receipt", 16.0, false, MUTED);
    pen.down(8.0);
    pen.rule(ACCENT, 2.0);
    pen.down(12.0);

    pen.field("Receipt ID:", &sheet.receipt_id);
    let date = sheet.issued_at.format("%A, %B %-d, %Y %H:%M UTC").to_string();
    pen.field("Date:", &date);
    pen.down(6.0);

    pen.line("STUDENT INFORMATION", 14.0, true);
    pen.down(2.0);
    pen.field("Name:", &sheet.student_name);
    pen.field("ID:", &sheet.student_id);
    pen.field("Email:", &sheet.student_email);
    pen.down(6.0);

    pen.line("PAYMENT DETAILS", 14.0, true);
    pen.down(2.0);
    pen.field("Amount:", &format!("${}", money(sheet.amount)));
    pen.field("Description:", &sheet.description);
    pen.down(10.0);

    pen.stamp("PAYMENT SUCCESSFUL", "Amount Received");
    pen.down(22.0);

    let branding = &sheet.branding;
    pen.centered(
        &format!("{} - {}", branding.name, branding.address),
        10.0,
        false,
        FAINT,
    );
    pen.down(5.5);
    pen.centered(&format!("Contact: {}", branding.contact), 10.0, false, FAINT);
    pen.down(5.5);
    pen.centered(
        &format!("This is an official payment receipt from {}", branding.name),
        10.0,
        false,
        FAINT,
    );
    pen.down(9.0);
    pen.centered("Thank you for your business!", 10.0, false, FAINT);

    doc.save_to_bytes()
}
