//! Geometry primitives shared by quads, passes and the renderer
//!
//! Float geometry (`Point`, `Size`, `Rect`, `QuadF`) describes content and
//! device space; integer geometry (`IntSize`, `IntRect`) describes pixel
//! grids such as quad rects, pass outputs, viewports and scissors.

// ─────────────────────────────────────────────────────────────────────────────
// Float Geometry
// ─────────────────────────────────────────────────────────────────────────────

/// 2D point
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn scale(&self, sx: f32, sy: f32) -> Self {
        Point::new(self.x * sx, self.y * sy)
    }
}

/// 2D size
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const ZERO: Size = Size {
        width: 0.0,
        height: 0.0,
    };

    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// 2D rectangle, origin at the top-left corner
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub origin: Point,
    pub size: Size,
}

impl Rect {
    pub const ZERO: Rect = Rect {
        origin: Point::ZERO,
        size: Size::ZERO,
    };

    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            origin: Point::new(x, y),
            size: Size::new(width, height),
        }
    }

    pub fn from_points(min: Point, max: Point) -> Self {
        Rect::new(min.x, min.y, max.x - min.x, max.y - min.y)
    }

    pub fn x(&self) -> f32 {
        self.origin.x
    }

    pub fn y(&self) -> f32 {
        self.origin.y
    }

    pub fn width(&self) -> f32 {
        self.size.width
    }

    pub fn height(&self) -> f32 {
        self.size.height
    }

    pub fn right(&self) -> f32 {
        self.origin.x + self.size.width
    }

    pub fn bottom(&self) -> f32 {
        self.origin.y + self.size.height
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn center(&self) -> Point {
        Point::new(
            self.origin.x + self.size.width / 2.0,
            self.origin.y + self.size.height / 2.0,
        )
    }

    pub fn is_empty(&self) -> bool {
        self.size.is_empty()
    }

    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.x() >= self.x()
            && other.y() >= self.y()
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Intersection of two rects; empty rects collapse to `Rect::ZERO`
    pub fn intersect(&self, other: &Rect) -> Rect {
        let x = self.x().max(other.x());
        let y = self.y().max(other.y());
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= x || bottom <= y {
            return Rect::ZERO;
        }
        Rect::new(x, y, right - x, bottom - y)
    }

    /// Smallest rect containing both; empty operands are ignored
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x = self.x().min(other.x());
        let y = self.y().min(other.y());
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect::new(x, y, right - x, bottom - y)
    }

    /// Offset the rect by a delta
    pub fn offset(&self, dx: f32, dy: f32) -> Self {
        Rect {
            origin: Point::new(self.origin.x + dx, self.origin.y + dy),
            size: self.size,
        }
    }

    /// Shrink each side independently; negative values grow the rect
    pub fn inset(&self, left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Rect::new(
            self.x() + left,
            self.y() + top,
            (self.width() - left - right).max(0.0),
            (self.height() - top - bottom).max(0.0),
        )
    }

    pub fn scale(&self, sx: f32, sy: f32) -> Self {
        Rect::new(
            self.x() * sx,
            self.y() * sy,
            self.width() * sx,
            self.height() * sy,
        )
    }

    /// Smallest integer rect covering this rect
    pub fn to_enclosing_int_rect(&self) -> IntRect {
        let x = self.x().floor();
        let y = self.y().floor();
        let right = self.right().ceil();
        let bottom = self.bottom().ceil();
        IntRect::new(x as i32, y as i32, (right - x) as i32, (bottom - y) as i32)
    }

    /// True when every side lies within `distance` of an integer
    pub fn is_nearest_rect_within_distance(&self, distance: f32) -> bool {
        let near = |v: f32| (v - v.round()).abs() <= distance;
        near(self.x()) && near(self.y()) && near(self.right()) && near(self.bottom())
    }
}

impl From<IntRect> for Rect {
    fn from(rect: IntRect) -> Self {
        Rect::new(
            rect.x as f32,
            rect.y as f32,
            rect.width as f32,
            rect.height as f32,
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Integer Geometry
// ─────────────────────────────────────────────────────────────────────────────

/// Pixel size
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct IntSize {
    pub width: i32,
    pub height: i32,
}

impl IntSize {
    pub const ZERO: IntSize = IntSize {
        width: 0,
        height: 0,
    };

    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn enlarge(&self, dw: i32, dh: i32) -> Self {
        IntSize::new(self.width + dw, self.height + dh)
    }

    /// True when both dimensions are at least as large as `other`
    pub fn covers(&self, other: IntSize) -> bool {
        self.width >= other.width && self.height >= other.height
    }

    pub fn to_size(&self) -> Size {
        Size::new(self.width as f32, self.height as f32)
    }

    /// Number of pixels, zero for empty sizes
    pub fn area(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            self.width as usize * self.height as usize
        }
    }
}

/// Pixel rectangle, origin at the top-left corner
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct IntRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl IntRect {
    pub const ZERO: IntRect = IntRect {
        x: 0,
        y: 0,
        width: 0,
        height: 0,
    };

    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub const fn from_size(size: IntSize) -> Self {
        IntRect::new(0, 0, size.width, size.height)
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn size(&self) -> IntSize {
        IntSize::new(self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn contains(&self, other: &IntRect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    pub fn intersect(&self, other: &IntRect) -> IntRect {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= x || bottom <= y {
            return IntRect::ZERO;
        }
        IntRect::new(x, y, right - x, bottom - y)
    }

    pub fn union(&self, other: &IntRect) -> IntRect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        IntRect::new(x, y, right - x, bottom - y)
    }

    pub fn offset(&self, dx: i32, dy: i32) -> IntRect {
        IntRect::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    pub fn to_rect(&self) -> Rect {
        Rect::from(*self)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Quadrilaterals
// ─────────────────────────────────────────────────────────────────────────────

/// Tolerance used when deciding whether a mapped quad is still axis-aligned
const RECTILINEAR_EPSILON: f32 = 1e-4;

/// Arbitrary quadrilateral, points in order top-left, top-right,
/// bottom-right, bottom-left for a quad built from a rect
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct QuadF {
    pub p1: Point,
    pub p2: Point,
    pub p3: Point,
    pub p4: Point,
}

impl QuadF {
    pub const fn new(p1: Point, p2: Point, p3: Point, p4: Point) -> Self {
        Self { p1, p2, p3, p4 }
    }

    pub fn from_rect(rect: Rect) -> Self {
        QuadF::new(
            Point::new(rect.x(), rect.y()),
            Point::new(rect.right(), rect.y()),
            Point::new(rect.right(), rect.bottom()),
            Point::new(rect.x(), rect.bottom()),
        )
    }

    pub fn points(&self) -> [Point; 4] {
        [self.p1, self.p2, self.p3, self.p4]
    }

    /// True when the quad's edges run along the axes
    pub fn is_rectilinear(&self) -> bool {
        let eq = |a: f32, b: f32| (a - b).abs() <= RECTILINEAR_EPSILON;
        (eq(self.p1.x, self.p2.x)
            && eq(self.p2.y, self.p3.y)
            && eq(self.p3.x, self.p4.x)
            && eq(self.p4.y, self.p1.y))
            || (eq(self.p1.y, self.p2.y)
                && eq(self.p2.x, self.p3.x)
                && eq(self.p3.y, self.p4.y)
                && eq(self.p4.x, self.p1.x))
    }

    pub fn bounding_box(&self) -> Rect {
        let pts = self.points();
        let mut min = pts[0];
        let mut max = pts[0];
        for p in &pts[1..] {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
        }
        Rect::from_points(min, max)
    }

    /// Twice the signed area (shoelace sum). Positive for a quad built from
    /// a rect in y-down coordinates.
    pub fn signed_area2(&self) -> f32 {
        let pts = self.points();
        let mut sum = 0.0;
        for i in 0..4 {
            let a = pts[i];
            let b = pts[(i + 1) % 4];
            sum += a.x * b.y - b.x * a.y;
        }
        sum
    }

    /// Winding relative to a quad built from a rect in y-down coordinates
    pub fn is_counter_clockwise(&self) -> bool {
        self.signed_area2() < 0.0
    }

    pub fn scale(&self, sx: f32, sy: f32) -> Self {
        QuadF::new(
            self.p1.scale(sx, sy),
            self.p2.scale(sx, sy),
            self.p3.scale(sx, sy),
            self.p4.scale(sx, sy),
        )
    }

    /// Flattened `[x1, y1, ... x4, y4]`
    pub fn to_array(&self) -> [f32; 8] {
        [
            self.p1.x, self.p1.y, self.p2.x, self.p2.y, self.p3.x, self.p3.y, self.p4.x,
            self.p4.y,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_intersect_and_union() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(5.0, 5.0, 10.0, 10.0);
        assert_eq!(a.intersect(&b), Rect::new(5.0, 5.0, 5.0, 5.0));
        assert_eq!(a.union(&b), Rect::new(0.0, 0.0, 15.0, 15.0));
        assert!(a.intersect(&Rect::new(20.0, 20.0, 1.0, 1.0)).is_empty());
        assert_eq!(Rect::ZERO.union(&b), b);
    }

    #[test]
    fn enclosing_int_rect_rounds_outward() {
        let r = Rect::new(0.5, 1.25, 9.0, 2.5);
        assert_eq!(r.to_enclosing_int_rect(), IntRect::new(0, 1, 10, 3));
    }

    #[test]
    fn nearest_rect_within_distance() {
        let eps = 1.0 / 1024.0;
        assert!(Rect::new(0.0, 0.0, 10.0, 10.0).is_nearest_rect_within_distance(eps));
        assert!(Rect::new(0.0005, 0.0, 10.0, 10.0).is_nearest_rect_within_distance(eps));
        assert!(!Rect::new(0.25, 0.0, 10.0, 10.0).is_nearest_rect_within_distance(eps));
    }

    #[test]
    fn int_rect_contains_and_intersect() {
        let outer = IntRect::new(0, 0, 100, 100);
        assert!(outer.contains(&IntRect::new(10, 10, 20, 20)));
        assert!(!outer.contains(&IntRect::new(90, 90, 20, 20)));
        assert_eq!(
            outer.intersect(&IntRect::new(90, 90, 20, 20)),
            IntRect::new(90, 90, 10, 10)
        );
    }

    #[test]
    fn quad_from_rect_is_rectilinear_and_clockwise() {
        let quad = QuadF::from_rect(Rect::new(1.0, 2.0, 3.0, 4.0));
        assert!(quad.is_rectilinear());
        assert!(!quad.is_counter_clockwise());
        assert_eq!(quad.bounding_box(), Rect::new(1.0, 2.0, 3.0, 4.0));
    }

    #[test]
    fn mirrored_quad_is_counter_clockwise() {
        let quad = QuadF::from_rect(Rect::new(0.0, 0.0, 2.0, 2.0)).scale(1.0, -1.0);
        assert!(quad.is_counter_clockwise());
    }
}
