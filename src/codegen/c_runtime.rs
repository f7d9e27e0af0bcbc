/// Fixed prelude: value representations, string and array helpers, and the
/// builtin functions. Builtins borrow their arguments.
pub const RUNTIME: &str = r#"#include <stdio.h>
#include <string.h>
#include <stdlib.h>
#include <stdint.h>

#define SWAP(x,y) do \
   { unsigned char swap_temp[sizeof(x) == sizeof(y) ? (signed)sizeof(x) : -1]; \
     memcpy(swap_temp,&y,sizeof(x)); \
     memcpy(&y,&x,sizeof(x)); \
     memcpy(&x,swap_temp,sizeof(x)); \
   } while(0)

typedef void *ptr_type;

struct string_type {
    long length;
    char *bytes;
};

struct array_type {
    long length;
    void *data;
};

static struct string_type init_string(const char *str, long l) {
    struct string_type v;
    v.length = l;
    v.bytes = malloc(l + 1);
    memcpy(v.bytes, str, l);
    v.bytes[l] = 0;
    return v;
}

static struct string_type copy_string(struct string_type str) {
    return init_string(str.bytes, str.length);
}

static struct string_type append_string_lit(struct string_type lhs, const char *bytes, long length) {
    struct string_type v;
    v.length = lhs.length + length;
    v.bytes = malloc(v.length + 1);
    memcpy(v.bytes, lhs.bytes, lhs.length);
    memcpy(v.bytes + lhs.length, bytes, length);
    v.bytes[v.length] = 0;
    return v;
}

static struct string_type append_string(struct string_type lhs, struct string_type rhs) {
    return append_string_lit(lhs, rhs.bytes, rhs.length);
}

static int streq_lit(struct string_type left, const char *right, long n) {
    return left.length == n && memcmp(left.bytes, right, n) == 0;
}

static int streq(struct string_type left, struct string_type right) {
    return streq_lit(left, right.bytes, right.length);
}

static struct string_type string_slice(struct string_type s, long start, long end) {
    if (end < 0 || end > s.length) {
        end = s.length;
    }
    if (start < 0) {
        start = 0;
    }
    if (start > end) {
        start = end;
    }
    return init_string(s.bytes + start, end - start);
}

static struct array_type array_slice(struct array_type a, long start, long end, size_t elem) {
    if (end < 0 || end > a.length) {
        end = a.length;
    }
    if (start < 0) {
        start = 0;
    }
    if (start > end) {
        start = end;
    }
    return (struct array_type){end - start, (char *)a.data + start * elem};
}

static struct array_type string_as_array(struct string_type s) {
    return (struct array_type){s.length, s.bytes};
}

static void _vs_println(struct string_type str) {
    fwrite(str.bytes, 1, str.length, stdout);
    fputc('\n', stdout);
}

static void _vs_print(struct string_type str) {
    fwrite(str.bytes, 1, str.length, stdout);
}

static struct string_type _vs_itoa(int64_t x) {
    char buf[24];
    int n = snprintf(buf, sizeof(buf), "%lld", (long long)x);
    return init_string(buf, n);
}

static unsigned char _vs_validptr(ptr_type p) {
    return p != NULL;
}
"#;
