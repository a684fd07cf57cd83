use crate::types::Frame;

/// Bone list of the 21-point hand model.
pub const CONNECTIONS: &[(usize, usize)] = &[
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 4),
    (0, 5),
    (5, 6),
    (6, 7),
    (7, 8),
    (0, 9),
    (9, 10),
    (10, 11),
    (11, 12),
    (0, 13),
    (13, 14),
    (14, 15),
    (15, 16),
    (0, 17),
    (17, 18),
    (18, 19),
    (19, 20),
    (5, 9),
    (9, 13),
    (13, 17),
];

const BONE_COLOR: [u8; 4] = [56, 189, 248, 255];
const JOINT_COLOR: [u8; 4] = [248, 113, 113, 255];
const BONE_THICKNESS: i32 = 5;
const JOINT_RADIUS: i32 = 4;

/// Draws one hand's bones and joints onto the frame, in frame pixels.
pub fn draw_hand(frame: &mut Frame, points: &[(f32, f32)]) {
    if points.len() < 2 {
        return;
    }

    let mut canvas = Canvas::new(frame);
    for &(a, b) in CONNECTIONS {
        if let (Some(&pa), Some(&pb)) = (points.get(a), points.get(b)) {
            canvas.line(pa, pb, BONE_COLOR, BONE_THICKNESS);
        }
    }
    for &(x, y) in points {
        canvas.disc((x as i32, y as i32), JOINT_RADIUS, JOINT_COLOR);
    }
}

struct Canvas<'a> {
    rgba: &'a mut [u8],
    width: i32,
    height: i32,
}

impl<'a> Canvas<'a> {
    fn new(frame: &'a mut Frame) -> Self {
        Self {
            width: frame.width as i32,
            height: frame.height as i32,
            rgba: &mut frame.rgba,
        }
    }

    fn put(&mut self, x: i32, y: i32, color: [u8; 4]) {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        if let Some(px) = self.rgba.get_mut(idx..idx + 4) {
            px.copy_from_slice(&color);
        }
    }

    fn disc(&mut self, (cx, cy): (i32, i32), radius: i32, color: [u8; 4]) {
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= radius * radius {
                    self.put(cx + dx, cy + dy, color);
                }
            }
        }
    }

    // Bresenham with a diamond brush for thickness.
    fn line(&mut self, from: (f32, f32), to: (f32, f32), color: [u8; 4], thickness: i32) {
        let brush = (thickness.max(1) - 1) / 2;
        let margin = brush as f32;
        let Some((from, to)) = clip_segment(
            from,
            to,
            (-margin, -margin),
            ((self.width - 1) as f32 + margin, (self.height - 1) as f32 + margin),
        ) else {
            return;
        };

        let (mut x, mut y) = (from.0.round() as i32, from.1.round() as i32);
        let (x1, y1) = (to.0.round() as i32, to.1.round() as i32);
        let dx = (x1 - x).abs();
        let dy = -(y1 - y).abs();
        let sx = if x < x1 { 1 } else { -1 };
        let sy = if y < y1 { 1 } else { -1 };
        let mut err = dx + dy;

        loop {
            for ox in -brush..=brush {
                for oy in -brush..=brush {
                    if ox.abs() + oy.abs() <= brush {
                        self.put(x + ox, y + oy, color);
                    }
                }
            }
            if x == x1 && y == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }
}

/// Liang-Barsky clip of a segment to the box `min..=max`; `None` when it misses.
fn clip_segment(
    from: (f32, f32),
    to: (f32, f32),
    min: (f32, f32),
    max: (f32, f32),
) -> Option<((f32, f32), (f32, f32))> {
    if ![from.0, from.1, to.0, to.1].iter().all(|v| v.is_finite()) || max.0 < min.0 || max.1 < min.1 {
        return None;
    }

    // f64 keeps far-off endpoints from swallowing the in-frame offsets.
    let (fx, fy) = (f64::from(from.0), f64::from(from.1));
    let (dx, dy) = (f64::from(to.0) - fx, f64::from(to.1) - fy);
    let (mut t0, mut t1) = (0.0_f64, 1.0_f64);
    for (p, q) in [
        (-dx, fx - f64::from(min.0)),
        (dx, f64::from(max.0) - fx),
        (-dy, fy - f64::from(min.1)),
        (dy, f64::from(max.1) - fy),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let t = q / p;
        if p < 0.0 {
            t0 = t0.max(t);
        } else {
            t1 = t1.min(t);
        }
        if t0 > t1 {
            return None;
        }
    }

    let at = |t: f64| ((fx + t * dx) as f32, (fy + t * dy) as f32);
    Some((at(t0), at(t1)))
}
