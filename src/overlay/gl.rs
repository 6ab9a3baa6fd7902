// overlay/gl.rs - OpenGL 1.x backend for the overlay draw list.
//
// Immediate mode only, so it works whatever profile the game asked for as
// long as compatibility calls are available. All GL state is pushed before
// drawing and popped after, leaving the game's pipeline untouched.
//
// Text comes from one texture: GDI rasterises the first 128 code points into
// a 16 x 8 grid once, and each glyph is a textured quad.

use super::draw::{coverage_to_rgba, glyph_uv, text_height, Color, DrawCmd, DrawList, ATLAS_COLS, ATLAS_H, ATLAS_W, GLYPH_H, GLYPH_W};
use super::Backend;
use crate::error::{BridgeError, Result};
use crate::projection::Viewport;
use std::ffi::c_void;
use std::ptr;
use winapi::shared::windef::HGDIOBJ;
use winapi::um::wingdi::{
    wglGetCurrentContext, CreateCompatibleDC, CreateDIBSection, CreateFontA, DeleteDC, DeleteObject, SelectObject,
    SetBkColor, SetTextAlign, SetTextColor, TextOutA, ANSI_CHARSET, BITMAPINFO, BITMAPINFOHEADER, BI_RGB,
    CLEARTYPE_QUALITY, CLIP_DEFAULT_PRECIS, DIB_RGB_COLORS, FF_SWISS, FW_BOLD, OUT_DEFAULT_PRECIS, RGB, TA_LEFT,
    TA_TOP, VARIABLE_PITCH,
};

const GL_ALL_ATTRIB_BITS: u32 = 0x000F_FFFF;
const GL_DEPTH_TEST: u32 = 0x0B71;
const GL_BLEND: u32 = 0x0BE2;
const GL_TEXTURE_2D: u32 = 0x0DE1;
const GL_LIGHTING: u32 = 0x0B50;
const GL_FOG: u32 = 0x0B60;
const GL_ALPHA_TEST: u32 = 0x0BC0;
const GL_CULL_FACE: u32 = 0x0B44;
const GL_SCISSOR_TEST: u32 = 0x0C11;
const GL_STENCIL_TEST: u32 = 0x0B90;
const GL_VIEWPORT: u32 = 0x0BA2;
const GL_SRC_ALPHA: u32 = 0x0302;
const GL_ONE_MINUS_SRC_ALPHA: u32 = 0x0303;
const GL_PROJECTION: u32 = 0x1701;
const GL_MODELVIEW: u32 = 0x1700;
const GL_LINE_LOOP: u32 = 0x0002;
const GL_QUADS: u32 = 0x0007;
const GL_RGBA: u32 = 0x1908;
const GL_UNSIGNED_BYTE: u32 = 0x1401;
const GL_TEXTURE_MIN_FILTER: u32 = 0x2801;
const GL_TEXTURE_MAG_FILTER: u32 = 0x2800;
const GL_LINEAR: i32 = 0x2601;

#[link(name = "opengl32")]
extern "system" {
    fn glPushAttrib(mask: u32);
    fn glPopAttrib();
    fn glDisable(cap: u32);
    fn glEnable(cap: u32);
    fn glBlendFunc(sfactor: u32, dfactor: u32);
    fn glMatrixMode(mode: u32);
    fn glPushMatrix();
    fn glPopMatrix();
    fn glLoadIdentity();
    fn glOrtho(left: f64, right: f64, bottom: f64, top: f64, zn: f64, zf: f64);
    fn glColor4f(r: f32, g: f32, b: f32, a: f32);
    fn glBegin(mode: u32);
    fn glVertex2f(x: f32, y: f32);
    fn glTexCoord2f(s: f32, t: f32);
    fn glEnd();
    fn glLineWidth(w: f32);
    fn glGetIntegerv(pname: u32, data: *mut i32);
    fn glGenTextures(n: i32, textures: *mut u32);
    fn glDeleteTextures(n: i32, textures: *const u32);
    fn glBindTexture(target: u32, texture: u32);
    fn glTexParameteri(target: u32, pname: u32, param: i32);
    fn glTexImage2D(
        target: u32,
        level: i32,
        internal: i32,
        width: i32,
        height: i32,
        border: i32,
        format: u32,
        kind: u32,
        pixels: *const c_void,
    );
}

/// Handle of the GL context current on this thread, 0 when none.
pub fn current_context() -> usize {
    unsafe { wglGetCurrentContext() as usize }
}

/// Size of the current GL viewport.
pub fn viewport() -> Option<Viewport> {
    let mut vp = [0i32; 4];
    unsafe { glGetIntegerv(GL_VIEWPORT, vp.as_mut_ptr()) };
    if vp[2] <= 0 || vp[3] <= 0 {
        return None;
    }
    Some(Viewport::new(vp[2] as f32, vp[3] as f32))
}

#[derive(Debug, Default)]
pub struct GlBackend {
    font_texture: u32,
}

impl GlBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for GlBackend {
    fn init(&mut self) -> Result<()> {
        let pixels = rasterise_font().ok_or(BridgeError::Render("font rasterisation"))?;
        let mut tex = 0u32;
        unsafe {
            glGenTextures(1, &mut tex);
            if tex == 0 {
                return Err(BridgeError::Render("glGenTextures"));
            }
            glBindTexture(GL_TEXTURE_2D, tex);
            glTexImage2D(
                GL_TEXTURE_2D,
                0,
                GL_RGBA as i32,
                ATLAS_W as i32,
                ATLAS_H as i32,
                0,
                GL_RGBA,
                GL_UNSIGNED_BYTE,
                pixels.as_ptr() as *const c_void,
            );
            glTexParameteri(GL_TEXTURE_2D, GL_TEXTURE_MIN_FILTER, GL_LINEAR);
            glTexParameteri(GL_TEXTURE_2D, GL_TEXTURE_MAG_FILTER, GL_LINEAR);
            glBindTexture(GL_TEXTURE_2D, 0);
        }
        self.font_texture = tex;
        Ok(())
    }

    fn teardown(&mut self, delete_objects: bool) {
        if delete_objects && self.font_texture != 0 {
            unsafe { glDeleteTextures(1, &self.font_texture) };
        }
        self.font_texture = 0;
    }

    fn draw(&mut self, list: &DrawList, viewport: Viewport) {
        unsafe {
            begin_2d(viewport.width, viewport.height);
            for cmd in &list.cmds {
                match cmd {
                    DrawCmd::FillRect { x0, y0, x1, y1, color } => fill_rect(*x0, *y0, *x1, *y1, *color),
                    DrawCmd::OutlineRect { x0, y0, x1, y1, color, width } => {
                        outline_rect(*x0, *y0, *x1, *y1, *color, *width)
                    }
                    DrawCmd::Text { x, y, text, color, scale } => {
                        draw_text(self.font_texture, *x, *y, text, *color, *scale)
                    }
                }
            }
            end_2d();
        }
    }
}

// ============================================================
// 2D state
// ============================================================

unsafe fn begin_2d(w: f32, h: f32) {
    glPushAttrib(GL_ALL_ATTRIB_BITS);
    glDisable(GL_DEPTH_TEST);
    glDisable(GL_TEXTURE_2D);
    glDisable(GL_LIGHTING);
    glDisable(GL_FOG);
    glDisable(GL_ALPHA_TEST);
    glDisable(GL_CULL_FACE);
    glDisable(GL_SCISSOR_TEST);
    glDisable(GL_STENCIL_TEST);
    glEnable(GL_BLEND);
    glBlendFunc(GL_SRC_ALPHA, GL_ONE_MINUS_SRC_ALPHA);
    glMatrixMode(GL_PROJECTION);
    glPushMatrix();
    glLoadIdentity();
    glOrtho(0.0, w as f64, h as f64, 0.0, -1.0, 1.0);
    glMatrixMode(GL_MODELVIEW);
    glPushMatrix();
    glLoadIdentity();
}

unsafe fn end_2d() {
    glPopMatrix();
    glMatrixMode(GL_PROJECTION);
    glPopMatrix();
    glPopAttrib();
}

// ============================================================
// Primitives
// ============================================================

unsafe fn fill_rect(x0: f32, y0: f32, x1: f32, y1: f32, c: Color) {
    glDisable(GL_TEXTURE_2D);
    glColor4f(c[0], c[1], c[2], c[3]);
    glBegin(GL_QUADS);
    glVertex2f(x0, y0);
    glVertex2f(x1, y0);
    glVertex2f(x1, y1);
    glVertex2f(x0, y1);
    glEnd();
}

unsafe fn outline_rect(x0: f32, y0: f32, x1: f32, y1: f32, c: Color, width: f32) {
    glDisable(GL_TEXTURE_2D);
    glLineWidth(width);
    glColor4f(c[0], c[1], c[2], c[3]);
    glBegin(GL_LINE_LOOP);
    glVertex2f(x0, y0);
    glVertex2f(x1, y0);
    glVertex2f(x1, y1);
    glVertex2f(x0, y1);
    glEnd();
}

unsafe fn draw_text(texture: u32, x: f32, y: f32, text: &str, c: Color, scale: f32) {
    if texture == 0 {
        return;
    }
    glEnable(GL_TEXTURE_2D);
    glBindTexture(GL_TEXTURE_2D, texture);
    glColor4f(c[0], c[1], c[2], c[3]);
    let (cw, ch) = (GLYPH_W * scale, text_height(scale));
    let mut cx = x;
    glBegin(GL_QUADS);
    for glyph in text.chars() {
        let [u0, v0, u1, v1] = glyph_uv(glyph);
        glTexCoord2f(u0, v0);
        glVertex2f(cx, y);
        glTexCoord2f(u1, v0);
        glVertex2f(cx + cw, y);
        glTexCoord2f(u1, v1);
        glVertex2f(cx + cw, y + ch);
        glTexCoord2f(u0, v1);
        glVertex2f(cx, y + ch);
        cx += cw;
    }
    glEnd();
    glDisable(GL_TEXTURE_2D);
}

// ============================================================
// Font atlas
// ============================================================

/// Render the atlas with GDI into a top-down 32-bit DIB and convert it to
/// white RGBA with coverage in alpha.
fn rasterise_font() -> Option<Vec<u8>> {
    unsafe {
        let hdc = CreateCompatibleDC(ptr::null_mut());
        if hdc.is_null() {
            return None;
        }
        let mut bmi: BITMAPINFO = std::mem::zeroed();
        bmi.bmiHeader = BITMAPINFOHEADER {
            biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
            biWidth: ATLAS_W as i32,
            biHeight: -(ATLAS_H as i32),
            biPlanes: 1,
            biBitCount: 32,
            biCompression: BI_RGB,
            ..std::mem::zeroed()
        };
        let mut bits: *mut c_void = ptr::null_mut();
        let bitmap = CreateDIBSection(hdc, &bmi, DIB_RGB_COLORS, &mut bits, ptr::null_mut(), 0);
        if bitmap.is_null() || bits.is_null() {
            DeleteDC(hdc);
            return None;
        }
        SelectObject(hdc, bitmap as HGDIOBJ);
        let font = CreateFontA(
            GLYPH_H as i32 - 2,
            0,
            0,
            0,
            FW_BOLD,
            0,
            0,
            0,
            ANSI_CHARSET,
            OUT_DEFAULT_PRECIS,
            CLIP_DEFAULT_PRECIS,
            CLEARTYPE_QUALITY,
            VARIABLE_PITCH | FF_SWISS,
            b"Consolas\0".as_ptr() as _,
        );
        if !font.is_null() {
            SelectObject(hdc, font as HGDIOBJ);
        }
        SetBkColor(hdc, RGB(0, 0, 0));
        SetTextColor(hdc, RGB(255, 255, 255));
        SetTextAlign(hdc, TA_LEFT | TA_TOP);
        for code in 32u8..128 {
            let col = code as usize % ATLAS_COLS;
            let row = code as usize / ATLAS_COLS;
            TextOutA(
                hdc,
                (col as f32 * GLYPH_W) as i32,
                (row as f32 * GLYPH_H) as i32,
                &code as *const u8 as _,
                1,
            );
        }
        let raw = std::slice::from_raw_parts(bits as *const u8, ATLAS_W * ATLAS_H * 4);
        let pixels = coverage_to_rgba(raw);

        if !font.is_null() {
            DeleteObject(font as HGDIOBJ);
        }
        DeleteObject(bitmap as HGDIOBJ);
        DeleteDC(hdc);
        Some(pixels)
    }
}
